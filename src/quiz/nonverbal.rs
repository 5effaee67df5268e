use rand::Rng;

use crate::quiz::Draft;

/// Operand redraws allowed before a question with colliding options is kept as-is.
pub const MAX_REDRAWS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonverbalKind {
    Ratio,
    Discount,
    ListSum,
    Probability,
    Arithmetic,
}

impl NonverbalKind {
    pub const ALL: [NonverbalKind; 5] = [
        NonverbalKind::Ratio,
        NonverbalKind::Discount,
        NonverbalKind::ListSum,
        NonverbalKind::Probability,
        NonverbalKind::Arithmetic,
    ];

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }

    /// Draws operands until the four options are distinct, giving up after `MAX_REDRAWS`.
    ///
    /// Rejected operands skew the distribution: `Ratio` effectively never asks
    /// about `a == 2b` and `Arithmetic` never about `b == 1`. The other kinds
    /// never collide, so their operands stay uniform.
    pub fn draft<R: Rng + ?Sized>(self, rng: &mut R) -> Draft {
        let mut draft = self.draft_once(rng);
        for _ in 0..MAX_REDRAWS {
            if draft.has_distinct_options() {
                break;
            }
            log::debug!("{:?} drew colliding options {:?}, redrawing", self, draft);
            draft = self.draft_once(rng);
        }
        draft
    }

    /// A single draw. Options may collide for some operands.
    pub fn draft_once<R: Rng + ?Sized>(self, rng: &mut R) -> Draft {
        match self {
            NonverbalKind::Ratio => {
                let a = rng.gen_range(2..=12);
                let b = rng.gen_range(1..a);
                ratio(a, b)
            }
            NonverbalKind::Discount => {
                let base = BASE_PRICES[rng.gen_range(0..BASE_PRICES.len())];
                let pct = DISCOUNT_RATES[rng.gen_range(0..DISCOUNT_RATES.len())];
                discount(base, pct)
            }
            NonverbalKind::ListSum => {
                let days = rng.gen_range(2..=5);
                let sales = (0..days).map(|_| rng.gen_range(5..=60)).collect::<Vec<u32>>();
                list_sum(&sales)
            }
            NonverbalKind::Probability => {
                let red = rng.gen_range(1..=5);
                let blue = rng.gen_range(1..=6);
                probability(red, blue)
            }
            NonverbalKind::Arithmetic => {
                let a = rng.gen_range(2..=12);
                let b = rng.gen_range(1..a);
                arithmetic(a, b)
            }
        }
    }
}

const BASE_PRICES: [u32; 4] = [1000, 1200, 1500, 2000];
const DISCOUNT_RATES: [u32; 4] = [10, 15, 20, 25];

fn ratio(a: u32, b: u32) -> Draft {
    Draft {
        prompt: format!("Aが{}個、Bが{}個のとき、A:Bは？", a, b),
        correct: format!("{}:{}", a, b),
        distractors: [
            format!("{}:{}", b, a),
            format!("{}:{}", a - b, b),
            format!("{}:{}", a, a - b),
        ],
    }
}

fn discount(base: u32, pct: u32) -> Draft {
    let off = base * pct / 100;
    Draft {
        prompt: format!("{}円の商品が{}%引き。割引額はいくら？", base, pct),
        correct: format!("{}円", off),
        distractors: [
            format!("{}円", base - off),
            format!("{}円", off + 50),
            format!("{}円", off.saturating_sub(50)),
        ],
    }
}

fn list_sum(sales: &[u32]) -> Draft {
    let total: u32 = sales.iter().sum();
    let listed = sales
        .iter()
        .map(|v| format!("{}個", v))
        .collect::<Vec<_>>()
        .join(", ");
    Draft {
        prompt: format!("{}日間でそれぞれ{}売れました。合計はいくつ？", sales.len(), listed),
        correct: format!("{}個", total),
        distractors: [
            format!("{}個", total + 3),
            format!("{}個", total.saturating_sub(2)),
            format!("{}個", total.saturating_sub(5).max(1)),
        ],
    }
}

fn probability(red: u32, blue: u32) -> Draft {
    let n = f64::from(red + blue);
    let red_f = f64::from(red);
    let pct = |p: f64| format!("{:.1}%", p * 100.0);
    let one_less = if red > 1 { (red_f - 1.0) / n } else { 0.0 };
    Draft {
        prompt: format!(
            "袋に赤{}、青{}。1個取り出すとき赤が出る確率は？（小数1位％）",
            red, blue
        ),
        correct: pct(red_f / n),
        distractors: [pct((red_f + 1.0) / n), pct(red_f / (n + 1.0)), pct(one_less)],
    }
}

fn arithmetic(a: u32, b: u32) -> Draft {
    Draft {
        prompt: format!("Aが{}個、Bが{}個。合わせるといくつ？", a, b),
        correct: (a + b).to_string(),
        distractors: [(a * b).to_string(), a.abs_diff(b).to_string(), a.max(b).to_string()],
    }
}
