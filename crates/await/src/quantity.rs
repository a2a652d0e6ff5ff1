//! Resource quantities (`500m`, `1Gi`, `2e3`) compared by value.

use serde_json::{Map, Value};

const NANO_EXP: i32 = 9;

/// Parse a quantity into nano-units. Precision below one nano-unit rounds up.
/// Returns `None` for malformed input or values that do not fit.
pub fn parse_quantity(s: &str) -> Option<i128> {
    let s = s.trim();
    let (negative, s) = match s.as_bytes().first()? {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };
    let num_end = s.find(|c: char| !(c.is_ascii_digit() || c == '.')).unwrap_or(s.len());
    let (number, suffix) = s.split_at(num_end);
    let (int_part, frac_part) = number.split_once('.').unwrap_or((number, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if frac_part.contains('.') {
        return None;
    }

    let mut digits: i128 = 0;
    for c in int_part.chars().chain(frac_part.chars()) {
        let d = c.to_digit(10)? as i128;
        digits = digits.checked_mul(10)?.checked_add(d)?;
    }

    let (exp10, binary_pow) = parse_suffix(suffix)?;
    let mut value = digits.checked_mul(1i128.checked_shl(binary_pow)?)?;
    let scale = NANO_EXP.checked_add(exp10)?.checked_sub(i32::try_from(frac_part.len()).ok()?)?;
    if scale >= 0 {
        value = value.checked_mul(10i128.checked_pow(scale as u32)?)?;
    } else {
        value = match 10i128.checked_pow(scale.unsigned_abs()) {
            Some(div) => value.checked_add(div - 1)? / div,
            None => i128::from(value > 0),
        };
    }
    Some(if negative { -value } else { value })
}

/// `(decimal exponent, binary exponent)` of a suffix.
fn parse_suffix(suffix: &str) -> Option<(i32, u32)> {
    let binary = match suffix {
        "Ki" => Some(10),
        "Mi" => Some(20),
        "Gi" => Some(30),
        "Ti" => Some(40),
        "Pi" => Some(50),
        "Ei" => Some(60),
        _ => None,
    };
    if let Some(b) = binary {
        return Some((0, b));
    }
    let decimal = match suffix {
        "n" => Some(-9),
        "u" => Some(-6),
        "m" => Some(-3),
        "" => Some(0),
        "k" => Some(3),
        "M" => Some(6),
        "G" => Some(9),
        "T" => Some(12),
        "P" => Some(15),
        "E" => Some(18),
        _ => None,
    };
    if let Some(e) = decimal {
        return Some((e, 0));
    }
    let exp = suffix.strip_prefix('e').or_else(|| suffix.strip_prefix('E'))?;
    let digits = exp.strip_prefix(['+', '-']).unwrap_or(exp);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some((exp.parse().ok()?, 0))
}

fn quantity_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Numeric equality when both sides parse, textual equality otherwise.
pub fn quantities_equal(a: &Value, b: &Value) -> bool {
    match (quantity_text(a), quantity_text(b)) {
        (Some(x), Some(y)) => match (parse_quantity(&x), parse_quantity(&y)) {
            (Some(p), Some(q)) => p == q,
            _ => x == y,
        },
        _ => a == b,
    }
}

/// Two resource lists (`{name: quantity}`) hold the same names with equal
/// quantities. A missing list counts as empty.
pub fn resource_lists_equal(a: Option<&Value>, b: Option<&Value>) -> bool {
    let empty = Map::new();
    let (Some(a), Some(b)) = (as_list(a, &empty), as_list(b, &empty)) else {
        return false;
    };
    a.len() == b.len() && a.iter().all(|(k, va)| b.get(k).is_some_and(|vb| quantities_equal(va, vb)))
}

fn as_list<'a>(v: Option<&'a Value>, empty: &'a Map<String, Value>) -> Option<&'a Map<String, Value>> {
    match v {
        None | Some(Value::Null) => Some(empty),
        Some(Value::Object(m)) => Some(m),
        Some(_) => None,
    }
}
