use rand::seq::{IteratorRandom, SliceRandom};
use rand::Rng;

use crate::quiz::Draft;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbalKind {
    Synonym,
    Antonym,
    Continuation,
    Nuance,
}

impl VerbalKind {
    pub const ALL: [VerbalKind; 4] = [
        VerbalKind::Synonym,
        VerbalKind::Antonym,
        VerbalKind::Continuation,
        VerbalKind::Nuance,
    ];

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }

    pub fn draft<R: Rng + ?Sized>(self, rng: &mut R) -> Draft {
        match self {
            VerbalKind::Synonym => {
                let (word, meaning) = pick(&SYNONYM_PAIRS, rng);
                table_draft(
                    format!("語の意味に最も近いものを選べ — 「{}」", word),
                    meaning,
                    &SYNONYM_DISTRACTORS,
                    rng,
                )
            }
            VerbalKind::Antonym => {
                let (word, opposite) = pick(&ANTONYM_PAIRS, rng);
                table_draft(
                    format!("次の語の反対語として最も適切なものを選べ — 「{}」", word),
                    opposite,
                    &ANTONYM_DISTRACTORS,
                    rng,
                )
            }
            VerbalKind::Continuation => {
                let (stem, ending) = pick(&CONTINUATION_STEMS, rng);
                table_draft(
                    format!("次に来る文として最も自然なものを選べ — 「{}」", stem),
                    ending,
                    &CONTINUATION_DISTRACTORS,
                    rng,
                )
            }
            VerbalKind::Nuance => {
                let (word, meaning) = pick(&NUANCE_PAIRS, rng);
                table_draft(
                    format!("次の語の意味に最も近いものを選べ — 「{}」", word),
                    meaning,
                    &NUANCE_DISTRACTORS,
                    rng,
                )
            }
        }
    }
}

const SYNONYM_PAIRS: [(&str, &str); 10] = [
    ("迅速", "すばやい"),
    ("頑強", "たくましい"),
    ("簡潔", "短くまとめる"),
    ("綿密", "細かく計画する"),
    ("慎重", "注意深い"),
    ("傲慢", "高慢"),
    ("冷淡", "無関心"),
    ("堅牢", "丈夫"),
    ("緩和", "和らげる"),
    ("融通", "柔軟性"),
];
const SYNONYM_DISTRACTORS: [&str; 8] = [
    "遅い",
    "弱い",
    "無関心",
    "複雑",
    "おおざっぱ",
    "長い",
    "短い",
    "穏やか",
];

const ANTONYM_PAIRS: [(&str, &str); 4] = [
    ("善良", "悪質"),
    ("多忙", "暇"),
    ("肯定", "否定"),
    ("昇進", "降格"),
];
const ANTONYM_DISTRACTORS: [&str; 8] = [
    "多い", "少ない", "早い", "遅い", "肯定", "否定", "強い", "弱い",
];

const CONTINUATION_STEMS: [(&str, &str); 3] = [
    ("私は計画を立て、", "実行に移した。"),
    ("実験の結果を踏まえて", "手順を見直した。"),
    ("予算が不足したため", "優先順位を変更した。"),
];
const CONTINUATION_DISTRACTORS: [&str; 3] =
    ["しかし失敗した。", "その後放置した。", "特に変化はなかった。"];

const NUANCE_PAIRS: [(&str, &str); 5] = [
    ("明確", "はっきりしている"),
    ("簡潔", "短く分かりやすい"),
    ("慎重", "注意深い"),
    ("革新的", "新しい"),
    ("抽象", "概念的"),
];
const NUANCE_DISTRACTORS: [&str; 7] = [
    "不明瞭",
    "長い",
    "雑な",
    "古い",
    "細かい",
    "確定的",
    "曖昧",
];

fn pick<R: Rng + ?Sized>(table: &[(&'static str, &'static str)], rng: &mut R) -> (&'static str, &'static str) {
    table[rng.gen_range(0..table.len())]
}

/// Builds a draft whose three distractors come from `table`, never equal to `correct`.
fn table_draft<R: Rng + ?Sized>(prompt: String, correct: &str, table: &[&str], rng: &mut R) -> Draft {
    let mut chosen = table
        .iter()
        .filter(|d| **d != correct)
        .choose_multiple(rng, 3)
        .into_iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>();
    // choose_multiple keeps iterator order for short inputs
    chosen.shuffle(rng);

    let mut distractors = chosen.into_iter();
    let mut next = || distractors.next().unwrap_or_default();
    Draft {
        prompt,
        correct: correct.to_string(),
        distractors: [next(), next(), next()],
    }
}
