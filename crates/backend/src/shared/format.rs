/// Форматирует число с разделителями тысяч (точками): 1234567 -> "1.234.567"
pub fn format_number(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, ch) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push('.');
        }
        result.push(ch);
    }
    result.chars().rev().collect()
}

/// Округление денежной суммы до копеек
pub fn round_money(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Округление процента до сотых
pub fn round_percent(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
