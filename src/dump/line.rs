use super::SectionKind;

/// One dump line, classified.
#[derive(Debug, PartialEq)]
pub enum Line<'a> {
    Blank,
    Header(SectionKind),
    Field(&'a str, &'a str),
    Unrecognized,
}

/// Pure function of the line. Splits on the first `:` only, so values may
/// themselves contain colons.
pub fn classify(raw: &str) -> Line<'_> {
    let line = raw.trim();

    if line.is_empty() {
        return Line::Blank;
    }

    if let Some(kind) = SectionKind::from_header(line) {
        return Line::Header(kind);
    }

    match line.find(':') {
        Some(index) => {
            let key = line[..index].trim();
            let value = line[index + 1..].trim();

            if key.is_empty() || value.is_empty() {
                Line::Unrecognized
            } else {
                Line::Field(key, value)
            }
        },
        None => Line::Unrecognized,
    }
}

#[test]
fn test_classify_headers() {
    assert_eq!(classify("Employee"), Line::Header(SectionKind::Employee));
    assert_eq!(classify("  Rate\r"), Line::Header(SectionKind::Rate));
    assert_eq!(classify("\tDonation "), Line::Header(SectionKind::Donation));

    // exact and case-sensitive
    assert_eq!(classify("employee"), Line::Unrecognized);
    assert_eq!(classify("Employees"), Line::Unrecognized);
    assert_eq!(classify("Payroll"), Line::Unrecognized);
}

#[test]
fn test_classify_fields() {
    assert_eq!(classify("name: Ann"), Line::Field("name", "Ann"));
    assert_eq!(classify("   surname   :   Smith  "), Line::Field("surname", "Smith"));
    assert_eq!(classify("amount: 50 USD"), Line::Field("amount", "50 USD"));
    assert_eq!(classify("time: 10:30"), Line::Field("time", "10:30"));
    assert_eq!(classify("Employee: 4"), Line::Field("Employee", "4"));
}

#[test]
fn test_classify_noise() {
    assert_eq!(classify(""), Line::Blank);
    assert_eq!(classify(" \t \r"), Line::Blank);
    assert_eq!(classify("name:"), Line::Unrecognized);
    assert_eq!(classify(": Ann"), Line::Unrecognized);
    assert_eq!(classify("  :  "), Line::Unrecognized);
    assert_eq!(classify("just some words"), Line::Unrecognized);
}
