use std::cmp::Ordering;
use std::path::{Path, PathBuf};

/// A run of either digits or non-digits
#[derive(Debug, PartialEq, Eq)]
enum Chunk<'a> {
    Number(&'a str),
    Text(&'a str),
}

/// Split string into numeric and non-numeric runs
fn chunks(s: &str) -> Vec<Chunk<'_>> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_digits = None;

    for (i, c) in s.char_indices() {
        let is_digit = c.is_ascii_digit();
        match in_digits {
            Some(prev) if prev != is_digit => {
                parts.push(make_chunk(&s[start..i], prev));
                start = i;
            }
            _ => {}
        }
        in_digits = Some(is_digit);
    }
    if let Some(prev) = in_digits {
        parts.push(make_chunk(&s[start..], prev));
    }
    parts
}

fn make_chunk(run: &str, digits: bool) -> Chunk<'_> {
    if digits {
        Chunk::Number(run)
    } else {
        Chunk::Text(run)
    }
}

/// Compare digit runs by value without parsing, so arbitrarily long runs work
fn cmp_numeric(a: &str, b: &str) -> Ordering {
    let a_trim = a.trim_start_matches('0');
    let b_trim = b.trim_start_matches('0');
    a_trim
        .len()
        .cmp(&b_trim.len())
        .then_with(|| a_trim.cmp(b_trim))
}

/// Natural sort comparison: digit runs compare by value, text runs case-insensitively.
/// Falls back to a plain byte comparison so distinct strings never compare equal.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let parts_a = chunks(a);
    let parts_b = chunks(b);

    for (pa, pb) in parts_a.iter().zip(parts_b.iter()) {
        let ord = match (pa, pb) {
            (Chunk::Number(na), Chunk::Number(nb)) => cmp_numeric(na, nb),
            (Chunk::Number(_), Chunk::Text(_)) => Ordering::Less,
            (Chunk::Text(_), Chunk::Number(_)) => Ordering::Greater,
            (Chunk::Text(ta), Chunk::Text(tb)) => ta.to_lowercase().cmp(&tb.to_lowercase()),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }

    parts_a
        .len()
        .cmp(&parts_b.len())
        .then_with(|| a.cmp(b))
}

/// Natural comparison of two paths, component by component
pub fn natural_cmp_paths(a: &Path, b: &Path) -> Ordering {
    let mut ca = a.components();
    let mut cb = b.components();
    loop {
        match (ca.next(), cb.next()) {
            (Some(x), Some(y)) => {
                let ord = natural_cmp(&x.as_os_str().to_string_lossy(), &y.as_os_str().to_string_lossy());
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(_), None) => return Ordering::Greater,
            (None, Some(_)) => return Ordering::Less,
            (None, None) => return Ordering::Equal,
        }
    }
}

/// Order discovered files for deterministic processing
pub fn sort_naturally(paths: &mut [PathBuf]) {
    paths.sort_by(|a, b| natural_cmp_paths(a, b));
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_episode_ordering() {
        let mut items = vec!["s1e2.mkv", "s1e10.mkv", "s1e1.mkv"];
        items.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(items, vec!["s1e1.mkv", "s1e2.mkv", "s1e10.mkv"]);
    }

    #[test]
    fn test_case_and_leading_zeros() {
        assert_eq!(natural_cmp("Ep 02", "ep 1"), Ordering::Greater);
        assert_eq!(natural_cmp("ep007", "ep7"), Ordering::Less);
        assert_eq!(natural_cmp("Movie", "movie 2"), Ordering::Less);
    }

    #[test]
    fn test_huge_numbers_do_not_overflow() {
        assert_eq!(
            natural_cmp("part99999999999999999999999", "part100000000000000000000000"),
            Ordering::Less
        );
    }

    #[test]
    fn test_paths_sort_by_directory_first() {
        let mut paths = vec![
            PathBuf::from("in/Season 10/e1.mkv"),
            PathBuf::from("in/Season 2/e10.mkv"),
            PathBuf::from("in/Season 2/e9.mkv"),
        ];
        sort_naturally(&mut paths);
        assert_eq!(
            paths,
            vec![
                PathBuf::from("in/Season 2/e9.mkv"),
                PathBuf::from("in/Season 2/e10.mkv"),
                PathBuf::from("in/Season 10/e1.mkv"),
            ]
        );
    }

    proptest! {
        #[test]
        fn test_numbers_sort_by_value(a in 0u64..1_000_000, b in 0u64..1_000_000) {
            let sa = format!("e{}.mkv", a);
            let sb = format!("e{}.mkv", b);
            prop_assert_eq!(natural_cmp(&sa, &sb), a.cmp(&b));
        }

        #[test]
        fn test_ordering_is_antisymmetric(a in "[a-z0-9 ]{0,12}", b in "[a-z0-9 ]{0,12}") {
            prop_assert_eq!(natural_cmp(&a, &b), natural_cmp(&b, &a).reverse());
        }
    }
}
