/// Canonical presentation order of grade codes.
pub const GRADE_ORDER: [&str; 5] = ["OP", "VIP", "R", "S", "A"];

/// Apron grade code; also the row id of the apron row.
pub const APRON_GRADE: &str = "OP";

/// Collapses grade synonyms ("vip석", "최전방", "r") to a canonical code.
pub fn normalize_grade(raw: &str) -> String {
    let trimmed = raw.trim();
    let canonical = match trimmed.to_lowercase().as_str() {
        "vip" | "vip석" | "vip좌석" => Some("VIP"),
        "op" | "op석" | "최전방" => Some("OP"),
        "r" | "r석" => Some("R"),
        "s" | "s석" => Some("S"),
        "a" | "a석" => Some("A"),
        _ => None,
    };
    match canonical {
        Some(code) => code.to_string(),
        None => trimmed.strip_suffix('석').unwrap_or(trimmed).to_uppercase(),
    }
}

/// Sort key; unknown grades go last and keep their relative order.
pub fn grade_rank(code: &str) -> usize {
    GRADE_ORDER
        .iter()
        .position(|g| *g == code)
        .unwrap_or(GRADE_ORDER.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synonyms_collapse() {
        assert_eq!(normalize_grade("vip석"), "VIP");
        assert_eq!(normalize_grade(" VIP좌석 "), "VIP");
        assert_eq!(normalize_grade("최전방"), "OP");
        assert_eq!(normalize_grade("R석"), "R");
        assert_eq!(normalize_grade("premium석"), "PREMIUM");
    }

    #[test]
    fn test_apron_is_not_vip() {
        assert_ne!(normalize_grade("op석"), normalize_grade("vip"));
    }

    #[test]
    fn test_rank_order() {
        let mut grades = vec!["A", "BOX", "VIP", "OP", "S", "R"];
        grades.sort_by_key(|g| grade_rank(g));
        assert_eq!(grades, vec!["OP", "VIP", "R", "S", "A", "BOX"]);
    }
}
