use std::borrow::Cow;

/// Marker appended to text cut short by [`truncate_chars`].
pub const TRUNCATION_MARKER: &str = "\u{2026}";

/// Truncates a string to at most `max_chars` Unicode scalar values.
///
/// If truncation is necessary, appends [`TRUNCATION_MARKER`] after the kept
/// prefix. The marker is not counted toward `max_chars`, so the kept prefix is
/// always exactly `max_chars` characters long when the input was longer.
///
/// The cut always lands on a `char` boundary, so multi-byte UTF-8 sequences
/// are never split.
///
/// # Returns
///
/// - If the string fits, returns `Cow::Borrowed(s)` (no allocation)
/// - If `max_chars == 0` and `s` is non-empty, returns just the marker
/// - Otherwise returns `Cow::Owned` with the prefix and the marker
///
/// # Examples
///
/// ```
/// use feedcast::util::truncate_chars;
///
/// assert_eq!(truncate_chars("Hi", 10), "Hi");
/// assert_eq!(truncate_chars("Hello world", 10), "Hello worl\u{2026}");
/// assert_eq!(truncate_chars("日本語テキスト", 3), "日本語\u{2026}");
/// ```
pub fn truncate_chars(s: &str, max_chars: usize) -> Cow<'_, str> {
    match s.char_indices().nth(max_chars) {
        // Fewer than max_chars + 1 chars: the whole string fits
        None => Cow::Borrowed(s),
        Some((cut, _)) => with_marker(&s[..cut]),
    }
}

/// Truncates a string so the summed `width` of the kept characters is at most
/// `max_width`, appending [`TRUNCATION_MARKER`] when anything was cut.
///
/// Like [`truncate_chars`], the marker is not counted and cuts land on `char`
/// boundaries. A character wider than the remaining budget is dropped along
/// with everything after it. Only the prefix up to the cut is measured.
///
/// ```
/// use feedcast::util::truncate_to_width;
///
/// let width = |c: char| if c == '&' { 5 } else { 1 };
/// assert_eq!(truncate_to_width("a&b", 7, width), "a&b");
/// assert_eq!(truncate_to_width("a&b", 6, width), "a&\u{2026}");
/// assert_eq!(truncate_to_width("a&b", 5, width), "a\u{2026}");
/// ```
pub fn truncate_to_width(
    s: &str,
    max_width: usize,
    width: impl Fn(char) -> usize,
) -> Cow<'_, str> {
    let mut used = 0usize;
    for (i, c) in s.char_indices() {
        used += width(c);
        if used > max_width {
            return with_marker(&s[..i]);
        }
    }
    Cow::Borrowed(s)
}

fn with_marker(prefix: &str) -> Cow<'static, str> {
    let mut out = String::with_capacity(prefix.len() + TRUNCATION_MARKER.len());
    out.push_str(prefix);
    out.push_str(TRUNCATION_MARKER);
    Cow::Owned(out)
}

/// Counts characters of `s`, ignoring a trailing [`TRUNCATION_MARKER`].
///
/// Applied to escaped item text, this is the measure the item bounds hold for.
pub fn bounded_len(s: &str) -> usize {
    s.strip_suffix(TRUNCATION_MARKER).unwrap_or(s).chars().count()
}

fn is_stripped_control(b: u8) -> bool {
    b == 0x1b || b == 0x7f || (b < 0x20 && b != b'\t' && b != b'\n' && b != b'\r')
}

/// Strips ASCII control characters and ANSI escape sequences from text.
///
/// Feed payloads occasionally carry raw terminal escapes or stray C0 bytes
/// that have no business in an HTML fragment.
///
/// Strips:
/// - ASCII control chars: 0x00-0x08, 0x0B-0x0C, 0x0E-0x1F, 0x7F
/// - ANSI CSI sequences: `\x1b[` ... (final byte 0x40-0x7E)
/// - ANSI OSC sequences: `\x1b]` ... (until BEL or ST `\x1b\\`)
/// - Bare ESC not followed by `[` or `]`
///
/// Tab, newline and carriage return are preserved. Returns `Cow::Borrowed`
/// when nothing needs stripping.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    let bytes = s.as_bytes();
    if !bytes.iter().any(|&b| is_stripped_control(b)) {
        return Cow::Borrowed(s);
    }

    let len = bytes.len();
    let mut out = String::with_capacity(len);
    let mut i = 0;

    while i < len {
        match bytes[i] {
            0x1b if bytes.get(i + 1) == Some(&b'[') => {
                i += 2;
                while i < len {
                    let c = bytes[i];
                    i += 1;
                    if (0x40..=0x7e).contains(&c) {
                        break;
                    }
                }
            }
            0x1b if bytes.get(i + 1) == Some(&b']') => {
                i += 2;
                while i < len {
                    if bytes[i] == 0x07 {
                        i += 1;
                        break;
                    }
                    if bytes[i] == 0x1b && bytes.get(i + 1) == Some(&b'\\') {
                        i += 2;
                        break;
                    }
                    i += 1;
                }
            }
            b if is_stripped_control(b) => i += 1,
            _ => {
                let start = i;
                while i < len && !is_stripped_control(bytes[i]) {
                    i += 1;
                }
                // Only ASCII bytes stop the run, so start..i is on char boundaries
                out.push_str(&s[start..i]);
            }
        }
    }

    Cow::Owned(out)
}

/// Collapses every run of whitespace into a single space and trims the ends.
pub fn collapse_whitespace(s: &str) -> Cow<'_, str> {
    let needs_work = s.starts_with(char::is_whitespace)
        || s.ends_with(char::is_whitespace)
        || s.contains("  ")
        || s.chars().any(|c| c.is_whitespace() && c != ' ');

    if !needs_work {
        return Cow::Borrowed(s);
    }

    Cow::Owned(s.split_whitespace().collect::<Vec<_>>().join(" "))
}
