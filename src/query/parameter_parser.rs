use std::collections::{HashMap, HashSet};

/// SQL placeholder parsing that respects string literal and identifier boundaries.
///
/// Placeholders follow SQLite numbering: a bare `?` takes the next index after
/// the largest one seen so far, `?NNN` refers to index NNN, and `:name`,
/// `@name` and `$name` get an index on first use and reuse it afterwards.
pub struct ParameterParser;

impl ParameterParser {
    /// Number of parameters a statement binds, i.e. its largest placeholder index
    pub fn count_parameters(sql: &str) -> usize {
        Self::find_parameters(sql).last().copied().unwrap_or(0)
    }

    /// Distinct 1-based parameter indices referenced by `sql`, in ascending order
    pub fn find_parameters(sql: &str) -> Vec<usize> {
        let mut parameters = HashSet::new();
        let mut named: HashMap<&str, usize> = HashMap::new();
        let mut highest = 0;
        let mut chars = sql.char_indices().peekable();

        while let Some((i, ch)) = chars.next() {
            match ch {
                // String literals and quoted identifiers
                '\'' | '"' | '`' => {
                    let quote = ch;
                    while let Some((_, inner_ch)) = chars.next() {
                        if inner_ch == quote {
                            // Doubled quote is an escape, stay inside the literal
                            if let Some((_, next_ch)) = chars.peek() {
                                if *next_ch == quote {
                                    chars.next();
                                    continue;
                                }
                            }
                            break;
                        }
                    }
                }
                // Bracketed identifier, no escapes
                '[' => {
                    for (_, inner_ch) in chars.by_ref() {
                        if inner_ch == ']' {
                            break;
                        }
                    }
                }
                // Line comment
                '-' if matches!(chars.peek(), Some((_, '-'))) => {
                    for (_, inner_ch) in chars.by_ref() {
                        if inner_ch == '\n' {
                            break;
                        }
                    }
                }
                // Block comment
                '/' if matches!(chars.peek(), Some((_, '*'))) => {
                    chars.next();
                    let mut prev = '\0';
                    for (_, inner_ch) in chars.by_ref() {
                        if prev == '*' && inner_ch == '/' {
                            break;
                        }
                        prev = inner_ch;
                    }
                }
                '?' => {
                    let start = i + 1;
                    let mut end = start;
                    while let Some((j, d)) = chars.peek() {
                        if !d.is_ascii_digit() {
                            break;
                        }
                        end = j + 1;
                        chars.next();
                    }

                    let index = if end > start {
                        // ?0 is rejected by the driver itself
                        sql[start..end].parse().unwrap_or(0)
                    } else {
                        highest + 1
                    };
                    if index > 0 {
                        highest = highest.max(index);
                        parameters.insert(index);
                    }
                }
                ':' | '@' | '$' if matches!(chars.peek(), Some((_, c)) if is_name_char(*c)) => {
                    let mut end = i + 1;
                    while let Some((j, c)) = chars.peek() {
                        if !is_name_char(*c) {
                            break;
                        }
                        end = j + c.len_utf8();
                        chars.next();
                    }

                    let name = &sql[i..end];
                    let index = *named.entry(name).or_insert_with(|| {
                        highest += 1;
                        highest
                    });
                    parameters.insert(index);
                }
                _ => {}
            }
        }

        let mut result: Vec<usize> = parameters.into_iter().collect();
        result.sort_unstable();
        result
    }
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}
