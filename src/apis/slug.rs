/// Convert a movie title into the URL-safe slug form the review sites use.
/// Lowercases, maps whitespace/underscore/hyphen runs to `sep`, and drops
/// everything that is not ASCII alphanumeric. Metacritic slugs use `-`,
/// Rotten Tomatoes uses `_`.
pub fn slugify(title: &str, sep: char) -> String {
    let mut out = String::with_capacity(title.len());
    let mut pending_sep = false;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push(sep);
            }
            pending_sep = false;
            out.push(c.to_ascii_lowercase());
        } else if c.is_whitespace() || c == '_' || c == '-' {
            pending_sep = true;
        }
        // All other punctuation is dropped without introducing a separator
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spaces_become_separators() {
        assert_eq!(slugify("The Matrix", '-'), "the-matrix");
        assert_eq!(slugify("The Matrix", '_'), "the_matrix");
    }

    #[test]
    fn punctuation_is_dropped() {
        assert_eq!(
            slugify("Spider-Man: No Way Home", '-'),
            "spider-man-no-way-home"
        );
        assert_eq!(slugify("WALL·E", '_'), "walle");
    }

    #[test]
    fn non_ascii_letters_are_stripped() {
        assert_eq!(slugify("Amélie", '-'), "amlie");
    }

    #[test]
    fn separator_runs_collapse() {
        assert_eq!(slugify("  12   Angry  Men ", '_'), "12_angry_men");
        assert_eq!(slugify("---", '-'), "");
    }
}
