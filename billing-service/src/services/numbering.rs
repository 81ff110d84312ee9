//! Human-readable invoice numbers (`INV-<n>`).

pub const INVOICE_PREFIX: &str = "INV-";

/// Sequence value of a company's first invoice.
pub const FIRST_INVOICE_NUMBER: i64 = 1000;

pub fn format_invoice_number(sequence: i64) -> String {
    format!("{}{}", INVOICE_PREFIX, sequence)
}

/// Numeric suffix of an `INV-<n>` string.
pub fn parse_invoice_number(number: &str) -> Option<i64> {
    number
        .strip_prefix(INVOICE_PREFIX)
        .and_then(|suffix| suffix.parse::<i64>().ok())
        .filter(|n| *n >= 0)
}

/// Sequence value following the highest one already issued.
pub fn next_after(highest: Option<i64>) -> i64 {
    highest.map_or(FIRST_INVOICE_NUMBER, |n| n + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_invoice_is_inv_1000() {
        assert_eq!(format_invoice_number(next_after(None)), "INV-1000");
    }

    #[test]
    fn follows_highest_existing_number() {
        let existing = ["INV-1000", "INV-1001", "INV-1002"];
        let highest = existing.iter().filter_map(|n| parse_invoice_number(n)).max();
        assert_eq!(format_invoice_number(next_after(highest)), "INV-1003");
    }

    #[test]
    fn parse_rejects_foreign_formats() {
        assert_eq!(parse_invoice_number("INV-42"), Some(42));
        assert_eq!(parse_invoice_number("INV-"), None);
        assert_eq!(parse_invoice_number("INV-abc"), None);
        assert_eq!(parse_invoice_number("BILL-1000"), None);
        assert_eq!(parse_invoice_number("INV--5"), None);
    }
}
