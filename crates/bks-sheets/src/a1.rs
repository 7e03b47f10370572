//! A1-notation helpers.

/// 0 → `A`, 25 → `Z`, 26 → `AA`.
pub(crate) fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut out = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        out.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// Sheet names are always quoted; embedded quotes are doubled.
pub(crate) fn quote_sheet(sheet: &str) -> String {
    format!("'{}'", sheet.replace('\'', "''"))
}

/// `'Sheet'!A{first}:{col}{last}` for a single column.
pub(crate) fn column_range(sheet: &str, column: usize, first: u32, last: u32) -> String {
    let col = column_letter(column);
    format!("{}!{col}{first}:{col}{last}", quote_sheet(sheet))
}

/// `'Sheet'!A{row}:{last_col}{row}` spanning `width` columns.
pub(crate) fn row_range(sheet: &str, row: u32, width: usize) -> String {
    format!(
        "{}!A{row}:{}{row}",
        quote_sheet(sheet),
        column_letter(width.saturating_sub(1))
    )
}

/// First row number of a range such as `'Sheet'!A12:H12` or `Sheet!A12`.
pub(crate) fn first_row(range: &str) -> Option<u32> {
    let cells = range.rsplit_once('!').map(|(_, c)| c).unwrap_or(range);
    let start = cells.split(':').next()?;
    let digits: String = start.chars().skip_while(|c| c.is_ascii_alphabetic()).collect();
    digits.parse().ok().filter(|r| *r > 0)
}
