use serde::Serialize;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::exit_codes::EXIT_ERROR;
use crate::CliError;

/// Pad with spaces to `width` display columns, or cut to fit ending in "..".
/// Widths are display columns, not bytes.
pub(crate) fn pad_right(s: &str, width: usize) -> String {
    let sw = UnicodeWidthStr::width(s);
    if sw <= width {
        return format!("{}{}", s, " ".repeat(width - sw));
    }

    let budget = width.saturating_sub(2);
    let mut out = String::new();
    let mut used = 0;
    for ch in s.chars() {
        let cw = UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + cw > budget {
            break;
        }
        used += cw;
        out.push(ch);
    }
    if width >= 2 {
        out.push_str("..");
        used += 2;
    }
    out.push_str(&" ".repeat(width.saturating_sub(used)));
    out
}

/// Quantity for human output: whole units from 1000 up, else two decimals.
pub(crate) fn fmt_quantity(q: f64) -> String {
    if q.abs() >= 1000.0 {
        format!("{q:.0}")
    } else {
        format!("{q:.2}")
    }
}

/// Pretty JSON for stdout and result files. Failure here is a bug, not bad input.
pub(crate) fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, CliError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| CliError::new(EXIT_ERROR, format!("JSON serialization error: {e}")))
}
