//! Identifier case conversion between snake_case column names and camelCase keys.

/// "user_id" -> "userId".
pub fn to_camel_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut capitalize_next = false;
    for c in s.chars() {
        if c == '_' {
            capitalize_next = true;
        } else if capitalize_next {
            out.extend(c.to_uppercase());
            capitalize_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// "userId" -> "user_id".
pub fn to_snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_between_cases() {
        assert_eq!(to_camel_case("dump_file"), "dumpFile");
        assert_eq!(to_camel_case("count"), "count");
        assert_eq!(to_snake_case("truncateBeforeInsert"), "truncate_before_insert");
        assert_eq!(to_snake_case("name"), "name");
    }
}
