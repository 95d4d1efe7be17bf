// A1-style cell reference helpers shared by the engine, xlsx I/O and the CLI.

/// Convert a 0-based column index to letters (0 = A, 25 = Z, 26 = AA).
pub fn col_to_letters(col: usize) -> String {
    let mut result = String::new();
    let mut n = col;
    loop {
        result.insert(0, (b'A' + (n % 26) as u8) as char);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    result
}

/// Convert column letters to a 0-based index (A = 0, Z = 25, AA = 26).
pub fn col_from_letters(letters: &str) -> Option<usize> {
    if letters.is_empty() {
        return None;
    }
    let mut col = 0usize;
    for c in letters.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        col = col
            .checked_mul(26)?
            .checked_add(c.to_ascii_uppercase() as usize - 'A' as usize + 1)?;
    }
    Some(col - 1)
}

/// Parse a user-facing column into a 1-based column number.
///
/// Accepts letters (`L`, `aa`) or a positive number (`12`).
pub fn parse_column(input: &str) -> Option<usize> {
    let input = input.trim();
    if let Ok(n) = input.parse::<usize>() {
        return (n > 0).then_some(n);
    }
    col_from_letters(input).map(|c| c + 1)
}

/// Parse a cell reference like `L2` or `$L$2` into 0-based (row, col).
pub fn parse_cell_ref(cell_ref: &str) -> Option<(usize, usize)> {
    let cleaned = cell_ref.replace('$', "");
    let cleaned = cleaned.trim();

    let split = cleaned.find(|c: char| c.is_ascii_digit())?;
    if split == 0 {
        return None;
    }

    let col = col_from_letters(&cleaned[..split])?;
    let row: usize = cleaned[split..].parse().ok()?;
    if row == 0 {
        return None;
    }

    Some((row - 1, col))
}
