use std::collections::BTreeMap;

use tracing::warn;

/// Splits `haystack` on every `delimiter`.
///
/// A string with N delimiters yields exactly N + 1 pieces, empty ones included.
pub fn str_split(haystack: &str, delimiter: char) -> Vec<&str> {
    haystack.split(delimiter).collect()
}

/// Removes leading and trailing whitespace
pub fn string_trim(s: &str) -> &str {
    s.trim()
}

/// Parses an `application/x-www-form-urlencoded` string such as `a=1&b=x+y`.
///
/// Keys and values are url-decoded, a key without `=` maps to an empty value and
/// empty segments are skipped. When a key repeats, the last value wins.
pub fn query_string_parse(query: &str) -> BTreeMap<String, String> {
    if query.is_empty() {
        return BTreeMap::new();
    }

    match serde_urlencoded::from_str::<Vec<(String, String)>>(query) {
        Ok(pairs) => pairs.into_iter().collect(),
        Err(e) => {
            warn!(cause = %e, "failed to parse form data");
            BTreeMap::new()
        }
    }
}

/// Parses a `Cookie` header value such as `x=1; y=2`.
///
/// Names and values are trimmed but not decoded. When a name repeats, the last value wins.
pub fn cookie_parse(header: &str) -> BTreeMap<String, String> {
    header
        .split(';')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(|segment| match segment.split_once('=') {
            Some((name, value)) => (name.trim().to_owned(), value.trim().to_owned()),
            None => (segment.to_owned(), String::new()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn split() {
        assert_eq!(str_split("a=b=c", '='), vec!["a", "b", "c"]);
        assert_eq!(str_split("", ','), vec![""]);
        assert_eq!(str_split(",", ','), vec!["", ""]);
        assert_eq!(str_split("a,,b,", ','), vec!["a", "", "b", ""]);
        assert_eq!(str_split("no delimiter", ';'), vec!["no delimiter"]);
    }

    #[test]
    fn trim() {
        assert_eq!(string_trim("  x y \t\r\n"), "x y");
        assert_eq!(string_trim("\n\t "), "");
        assert_eq!(string_trim("tight"), "tight");
    }

    #[test]
    fn query() {
        assert_eq!(query_string_parse("a=1&b=x+y"), map(&[("a", "1"), ("b", "x y")]));
        assert_eq!(query_string_parse("q=%E4%BD%A0&empty=&flag"), map(&[("q", "你"), ("empty", ""), ("flag", "")]));
        assert_eq!(query_string_parse("a%20b=c"), map(&[("a b", "c")]));
        assert_eq!(query_string_parse("&&a=1&"), map(&[("a", "1")]));
        assert!(query_string_parse("").is_empty());
    }

    #[test]
    fn query_duplicate_last_wins() {
        assert_eq!(query_string_parse("k=1&k=2&k=3"), map(&[("k", "3")]));
    }

    #[test]
    fn cookies() {
        assert_eq!(cookie_parse("x=1; y=2"), map(&[("x", "1"), ("y", "2")]));
        assert_eq!(cookie_parse(" session = abc%20def ;theme=dark;"), map(&[("session", "abc%20def"), ("theme", "dark")]));
        assert_eq!(cookie_parse("token=a=b"), map(&[("token", "a=b")]));
        assert_eq!(cookie_parse("bare; x=1"), map(&[("bare", ""), ("x", "1")]));
        assert_eq!(cookie_parse("x=1; x=2"), map(&[("x", "2")]));
        assert!(cookie_parse("").is_empty());
        assert!(cookie_parse(" ; ;").is_empty());
    }
}
