use serde_json::Value;

pub const MIN_MARKS: i64 = 0;
pub const MAX_MARKS: i64 = 100;

/// Letter-grade thresholds, evaluated top-down; the first satisfied bound
/// wins. Everything below the lowest bound is an F.
const GRADE_STEPS: [(i64, &str); 6] = [
    (90, "A+"),
    (80, "A"),
    (70, "B+"),
    (60, "B"),
    (50, "C"),
    (40, "D"),
];

pub fn letter_for(marks: i64) -> &'static str {
    for (min, letter) in GRADE_STEPS {
        if marks >= min {
            return letter;
        }
    }
    "F"
}

/// Marks arriving over IPC are whatever the form produced. Non-numeric and
/// out-of-range values are coerced to 0 before grading; that is a policy,
/// not an error path.
pub fn coerce_marks(raw: &Value) -> i64 {
    let n = match raw {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    match n {
        Some(m) if (MIN_MARKS..=MAX_MARKS).contains(&m) => m,
        _ => 0,
    }
}
