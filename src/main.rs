mod config;
mod error;
mod quiz;
mod report;
mod sheets;

use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use config::Config;
use dotenv::dotenv;
use error::AttemptError;
use quiz::{
    attempt::{Attempt, Phase},
    pool::{generate_pool, Pool},
    scoring::{synthetic_sample, Reference, ResultRecord},
    Category,
};
use sheets::Recorder;
use teloxide::{
    dispatching::{
        dialogue::{serializer::Json, ErasedStorage, SqliteStorage, Storage},
        UpdateHandler,
    },
    prelude::*,
    types::{KeyboardButton, KeyboardMarkup, KeyboardRemove, ParseMode},
    utils::{command::BotCommands, html},
};

type QuizDialogue = Dialogue<State, ErasedStorage<State>>;
type HandlerError = Box<dyn std::error::Error + Send + Sync>;
type HandlerResult = Result<(), HandlerError>;

#[derive(Clone, Default, serde::Serialize, serde::Deserialize)]
pub enum State {
    #[default]
    Start,
    ReceiveName,
    ReceiveEmail {
        name: String,
    },
    ReadyToStart {
        name: String,
        email: Option<String>,
    },
    InProgress {
        attempt: Attempt,
    },
    Finished {
        record: ResultRecord,
    },
}

type SessionStorage = std::sync::Arc<ErasedStorage<State>>;

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "使えるコマンド:")]
enum Command {
    #[command(description = "最初からやり直す")]
    Restart,
    #[command(description = "問題プールの件数を表示する")]
    Pool,
    #[command(description = "このヘルプを表示する")]
    Help,
}

#[tokio::main]
async fn main() -> HandlerResult {
    // .env is optional; real deployments set the variables directly
    dotenv().ok();

    pretty_env_logger::init();
    log::info!("Starting SPI mock test bot...");

    let config = Arc::new(Config::from_env()?);
    let bot = Bot::from_env();

    log::info!("Opening session storage at {}", config.db_path);
    let storage: SessionStorage = SqliteStorage::open(&config.db_path, Json).await?.erase();

    let pool = Arc::new(generate_pool(
        config.verbal_pool,
        config.nonverbal_pool,
        &mut rand::thread_rng(),
    ));
    if pool.is_empty() {
        log::warn!("Question pool is empty, attempts cannot start");
    } else {
        log::info!("Question pool built with {} questions", pool.len());
    }
    for category in Category::ALL {
        log::debug!("  {}: {}", category.as_str(), pool.category(category).len());
    }

    let recorder = Arc::new(Recorder::from_config(&config.sheet).await);
    if recorder.is_connected() {
        if let Err(e) = recorder.ensure_header().await {
            log::warn!("Could not prepare the result sheet: {}", e);
        }
    }

    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![storage, config, pool, recorder])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
    Ok(())
}

fn schema() -> UpdateHandler<HandlerError> {
    Update::filter_message()
        .enter_dialogue::<Message, ErasedStorage<State>, State>()
        .branch(
            dptree::entry()
                .filter_command::<Command>()
                .endpoint(handle_command),
        )
        .branch(dptree::case![State::Start].endpoint(start))
        .branch(dptree::case![State::ReceiveName].endpoint(receive_name))
        .branch(dptree::case![State::ReceiveEmail { name }].endpoint(receive_email))
        .branch(dptree::case![State::ReadyToStart { name, email }].endpoint(ready_to_start))
        .branch(dptree::case![State::InProgress { attempt }].endpoint(take_test))
        .branch(dptree::case![State::Finished { record }].endpoint(finished))
}

const SKIP_EMAIL: &str = "スキップ";
const START_TEST: &str = "テストを開始する";
const PREVIOUS: &str = "◀ 前へ";
const NEXT: &str = "次へ ▶";
const SUBMIT: &str = "提出して採点";
const RETRY: &str = "もう一度受ける";

const ASK_NAME: &str = "氏名（必須）を入力してください。";
const USE_BUTTONS: &str = "選択肢または下のボタンを使って回答してください（「Q12」で12問目へ移動）。";
const TIME_UP: &str = "時間切れです。自動で採点します。";

async fn handle_command(
    bot: Bot,
    dialogue: QuizDialogue,
    cmd: Command,
    pool: Arc<Pool>,
    msg: Message,
) -> HandlerResult {
    match cmd {
        Command::Restart => {
            log::debug!("Chat {} restarted", msg.chat.id.0);
            ask_name(&bot, &dialogue, msg.chat.id).await?;
        }
        Command::Pool => {
            let text = format!(
                "問題プール: 言語{} / 非言語{}",
                pool.category(Category::Verbal).len(),
                pool.category(Category::Nonverbal).len()
            );
            bot.send_message(msg.chat.id, text).await?;
        }
        Command::Help => {
            bot.send_message(msg.chat.id, Command::descriptions().to_string())
                .await?;
        }
    }
    Ok(())
}

async fn start(bot: Bot, dialogue: QuizDialogue, config: Arc<Config>, msg: Message) -> HandlerResult {
    let greeting = format!(
        "🧠 SPI 模擬テスト\n\
         言語{}問 + 非言語{}問 をランダム出題します（合計{}問）。制限時間：{}分\n\
         ※このテストは学習用です。実際のSPI問題のコピーではありません。",
        config.verbal_pick,
        config.nonverbal_pick,
        config.verbal_pick + config.nonverbal_pick,
        config.time_limit_min
    );
    bot.send_message(msg.chat.id, greeting).await?;
    ask_name(&bot, &dialogue, msg.chat.id).await
}

async fn ask_name(bot: &Bot, dialogue: &QuizDialogue, chat_id: ChatId) -> HandlerResult {
    bot.send_message(chat_id, ASK_NAME)
        .reply_markup(KeyboardRemove::new())
        .await?;
    dialogue.update(State::ReceiveName).await?;
    Ok(())
}

async fn receive_name(bot: Bot, dialogue: QuizDialogue, msg: Message) -> HandlerResult {
    let name = match msg.text().map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => {
            bot.send_message(msg.chat.id, "氏名を入力してください。").await?;
            return Ok(());
        }
    };

    bot.send_message(msg.chat.id, "メールアドレス（任意）を入力してください。")
        .reply_markup(KeyboardMarkup::new(vec![vec![KeyboardButton::new(SKIP_EMAIL)]]))
        .await?;
    dialogue.update(State::ReceiveEmail { name }).await?;
    Ok(())
}

async fn receive_email(
    bot: Bot,
    dialogue: QuizDialogue,
    name: String,
    msg: Message,
) -> HandlerResult {
    let email = match msg.text().map(str::trim) {
        Some(SKIP_EMAIL) => None,
        Some(email) if !email.is_empty() => Some(email.to_string()),
        _ => {
            bot.send_message(
                msg.chat.id,
                format!("メールアドレスを入力するか「{}」を押してください。", SKIP_EMAIL),
            )
            .await?;
            return Ok(());
        }
    };

    send_start_button(&bot, msg.chat.id, &name).await?;
    dialogue.update(State::ReadyToStart { name, email }).await?;
    Ok(())
}

async fn send_start_button(bot: &Bot, chat_id: ChatId, name: &str) -> HandlerResult {
    bot.send_message(
        chat_id,
        format!("{}さん、準備ができたら「{}」を押してください。", html::escape(name), START_TEST),
    )
    .parse_mode(ParseMode::Html)
    .reply_markup(KeyboardMarkup::new(vec![vec![KeyboardButton::new(START_TEST)]]))
    .await?;
    Ok(())
}

async fn ready_to_start(
    bot: Bot,
    dialogue: QuizDialogue,
    (name, email): (String, Option<String>),
    config: Arc<Config>,
    pool: Arc<Pool>,
    msg: Message,
) -> HandlerResult {
    if msg.text() != Some(START_TEST) {
        return send_start_button(&bot, msg.chat.id, &name).await;
    }

    let questions = pool.draw_attempt(config.verbal_pick, config.nonverbal_pick, &mut rand::thread_rng());
    let now = Utc::now();
    let mut attempt = Attempt::new(config.time_limit());
    match attempt.start(&name, email.as_deref(), questions, now) {
        Ok(()) => {}
        Err(AttemptError::EmptyName) => {
            return ask_name(&bot, &dialogue, msg.chat.id).await;
        }
        Err(e) => {
            log::warn!("Could not start an attempt for chat {}: {}", msg.chat.id.0, e);
            bot.send_message(msg.chat.id, format!("テストを開始できませんでした: {}", e))
                .await?;
            return Ok(());
        }
    }

    log::info!(
        "Chat {} started an attempt with {} questions",
        msg.chat.id.0,
        attempt.items().len()
    );
    send_item(&bot, msg.chat.id, &attempt, now).await?;
    dialogue.update(State::InProgress { attempt }).await?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Select(usize),
    /// 0-based item index.
    GoTo(usize),
    Previous,
    Next,
    Submit,
}

impl Action {
    /// Reads a button press. Option buttons look like `"2. 注意深い"`; a bare number works too.
    /// `"Q12"` jumps to the twelfth item.
    fn parse(text: &str) -> Option<Self> {
        match text.trim() {
            PREVIOUS => Some(Action::Previous),
            NEXT => Some(Action::Next),
            SUBMIT => Some(Action::Submit),
            other if other.starts_with(['Q', 'q']) => {
                let number: usize = other[1..].trim().parse().ok()?;
                number.checked_sub(1).map(Action::GoTo)
            }
            other => {
                let number = other.split_once('.').map_or(other, |(n, _)| n);
                number.trim().parse().ok().map(Action::Select)
            }
        }
    }
}

async fn take_test(
    bot: Bot,
    dialogue: QuizDialogue,
    attempt: Attempt,
    recorder: Arc<Recorder>,
    msg: Message,
) -> HandlerResult {
    let mut attempt = attempt;
    let now = Utc::now();
    let action = msg.text().and_then(Action::parse);
    log::debug!("Chat {}: {:?} on item {}", msg.chat.id.0, action, attempt.current() + 1);

    let outcome = match action {
        Some(Action::Select(option)) => attempt.select(option, now),
        Some(Action::GoTo(index)) => attempt.go_to(index, now),
        Some(Action::Previous) => attempt.previous(now),
        Some(Action::Next) => attempt.next(now),
        Some(Action::Submit) => attempt.submit(now),
        // Unrecognised input still counts as an interaction for the deadline.
        None => attempt.check_deadline(now),
    };

    if matches!(attempt.phase(), Phase::Submitted | Phase::TimedOut) {
        if attempt.phase() == Phase::TimedOut {
            bot.send_message(msg.chat.id, TIME_UP).await?;
        }
        return finish(&bot, &dialogue, attempt, &recorder, msg.chat.id).await;
    }

    match outcome {
        Ok(()) if action.is_none() => {
            bot.send_message(msg.chat.id, USE_BUTTONS).await?;
        }
        Ok(()) => {}
        Err(AttemptError::InvalidOption(option)) => {
            bot.send_message(msg.chat.id, format!("選択肢{}はありません。", option))
                .await?;
        }
        Err(AttemptError::InvalidItem(index)) => {
            bot.send_message(
                msg.chat.id,
                format!("Q{}はありません（全{}問）。", index + 1, attempt.items().len()),
            )
            .await?;
        }
        Err(e) => {
            log::warn!("Chat {}: unexpected attempt error: {}", msg.chat.id.0, e);
        }
    }

    send_item(&bot, msg.chat.id, &attempt, now).await?;
    dialogue.update(State::InProgress { attempt }).await?;
    Ok(())
}

async fn send_item(bot: &Bot, chat_id: ChatId, attempt: &Attempt, now: DateTime<Utc>) -> HandlerResult {
    let Some(view) = attempt.view(now) else {
        return Ok(());
    };

    let remaining = view.remaining.num_seconds();
    let mut text = format!(
        "<b>Q{}/{}</b>（{}）\n残り時間: {}分{}秒 ／ 回答済み: {} / {}\n\n{}\n",
        view.position,
        view.total,
        view.category.label(),
        remaining / 60,
        remaining % 60,
        view.answered,
        view.total,
        html::escape(view.prompt)
    );
    for (i, option) in view.options.iter().enumerate() {
        let mark = if view.selected == Some(i + 1) { "✅ " } else { "" };
        text.push_str(&format!("\n{}{}. {}", mark, i + 1, html::escape(option)));
    }

    let mut keyboard = view
        .options
        .iter()
        .enumerate()
        .map(|(i, option)| vec![KeyboardButton::new(format!("{}. {}", i + 1, option))])
        .collect::<Vec<_>>();
    keyboard.push(vec![KeyboardButton::new(PREVIOUS), KeyboardButton::new(NEXT)]);
    keyboard.push(vec![KeyboardButton::new(SUBMIT)]);

    bot.send_message(chat_id, text)
        .parse_mode(ParseMode::Html)
        .reply_markup(KeyboardMarkup::new(keyboard))
        .await?;
    Ok(())
}

/// Scores the attempt, shows the result and hands it to the spreadsheet.
/// A failed save is reported but never hides the result.
async fn finish(
    bot: &Bot,
    dialogue: &QuizDialogue,
    mut attempt: Attempt,
    recorder: &Recorder,
    chat_id: ChatId,
) -> HandlerResult {
    let history = recorder.history().await;
    let reference = Reference::from_history(&history, &mut rand::thread_rng());
    let record = attempt.score(&reference, Local::now().naive_local())?;
    log::info!(
        "Chat {} scored {}/{} ({:.1}%), T = {:.1} against {:?} reference",
        chat_id.0,
        record.total_correct,
        record.total_questions,
        record.total_pct,
        record.standard_score,
        reference.source
    );

    bot.send_message(chat_id, report::render_result(&record))
        .parse_mode(ParseMode::Html)
        .reply_markup(KeyboardRemove::new())
        .await?;

    let distribution = if history.is_empty() {
        synthetic_sample(&mut rand::thread_rng())
    } else {
        history
    };
    bot.send_message(chat_id, report::render_histogram(&distribution, record.total_pct))
        .parse_mode(ParseMode::Html)
        .await?;

    let saved = match recorder.append(&record).await {
        Ok(()) => {
            log::info!("Result for chat {} appended to the sheet", chat_id.0);
            "✅ 結果をスプレッドシートに記録しました。".to_string()
        }
        Err(e) if e.is_auth() => {
            log::warn!("Result for chat {} not recorded: {}", chat_id.0, e);
            format!("スプレッドシートに接続できません。結果は画面で確認してください。({})", e)
        }
        Err(e) => {
            log::warn!("Result for chat {} not recorded: {}", chat_id.0, e);
            format!("スプレッドシート保存に失敗しました: {}", e)
        }
    };
    bot.send_message(chat_id, saved)
        .reply_markup(KeyboardMarkup::new(vec![vec![KeyboardButton::new(RETRY)]]))
        .await?;

    dialogue.update(State::Finished { record }).await?;
    Ok(())
}

async fn finished(bot: Bot, dialogue: QuizDialogue, msg: Message) -> HandlerResult {
    if msg.text() == Some(RETRY) {
        return ask_name(&bot, &dialogue, msg.chat.id).await;
    }
    bot.send_message(
        msg.chat.id,
        format!("もう一度受ける場合は「{}」を押してください。", RETRY),
    )
    .reply_markup(KeyboardMarkup::new(vec![vec![KeyboardButton::new(RETRY)]]))
    .await?;
    Ok(())
}
