//! Object-key sanitization for machine names.
//!
//! Machine directories are named by operators and can contain anything;
//! object-store key prefixes (and bucket names) cannot. `sanitize_name`
//! maps an arbitrary name onto the `[a-z0-9.-]` alphabet deterministically,
//! so the same machine always lands under the same prefix.

/// Sanitizes a string for use as an object-store key prefix or bucket name.
///
/// Rules, in order: lowercase; `_` and space become `-`; any character
/// outside `[a-z0-9.-]` is dropped; runs of `-` and runs of `.` collapse to
/// one; leading/trailing `-`/`.` are trimmed; a non-alphanumeric first or
/// last character is guarded with `a`/`z`.
///
/// Total and idempotent: never fails, and sanitizing twice is a no-op.
pub fn sanitize_name(name: &str) -> String {
    let mut collapsed = String::with_capacity(name.len());
    let mut prev: Option<char> = None;

    for c in name.to_lowercase().chars() {
        let c = match c {
            '_' | ' ' => '-',
            c if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-' => c,
            _ => continue,
        };
        if (c == '-' || c == '.') && prev == Some(c) {
            continue;
        }
        collapsed.push(c);
        prev = Some(c);
    }

    let mut out = collapsed
        .trim_matches(|c| c == '-' || c == '.')
        .to_string();

    if let Some(first) = out.chars().next() {
        if !first.is_ascii_alphanumeric() {
            out.insert(0, 'a');
        }
    }
    if let Some(last) = out.chars().last() {
        if !last.is_ascii_alphanumeric() {
            out.push('z');
        }
    }

    out
}
