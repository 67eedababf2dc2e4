//! Static per-mode filter tables and the passband edge derivation.
//!
//! The passband `[filter_low, filter_high]` is always a pure function of
//! `(mode, table entry, CW sidetone, FM deviation)`. Nothing else in the
//! crate writes the derived edges directly.

use crate::modes::Mode;

/// One selectable filter: passband edges in Hz relative to the tuned
/// center (before any CW sidetone shift) and a display label.
#[derive(Debug, Clone, Copy)]
pub struct FilterEntry {
    pub low: i64,
    pub high: i64,
    pub label: &'static str,
}

pub const FILTERS_PER_MODE: usize = 12;

/// Index of the first user-variable entry in each table.
pub const FILTER_VAR1: usize = 10;
pub const FILTER_VAR2: usize = 11;

const fn f(low: i64, high: i64, label: &'static str) -> FilterEntry {
    FilterEntry { low, high, label }
}

static FILTER_LSB: [FilterEntry; FILTERS_PER_MODE] = [
    f(-5150, -150, "5.0k"),
    f(-4550, -150, "4.4k"),
    f(-3950, -150, "3.8k"),
    f(-3450, -150, "3.3k"),
    f(-3050, -150, "2.9k"),
    f(-2850, -150, "2.7k"),
    f(-2550, -150, "2.4k"),
    f(-2250, -150, "2.1k"),
    f(-1950, -150, "1.8k"),
    f(-1150, -150, "1.0k"),
    f(-2850, -150, "Var1"),
    f(-2850, -150, "Var2"),
];

static FILTER_USB: [FilterEntry; FILTERS_PER_MODE] = [
    f(150, 5150, "5.0k"),
    f(150, 4550, "4.4k"),
    f(150, 3950, "3.8k"),
    f(150, 3450, "3.3k"),
    f(150, 3050, "2.9k"),
    f(150, 2850, "2.7k"),
    f(150, 2550, "2.4k"),
    f(150, 2250, "2.1k"),
    f(150, 1950, "1.8k"),
    f(150, 1150, "1.0k"),
    f(150, 2850, "Var1"),
    f(150, 2850, "Var2"),
];

static FILTER_DIGL: [FilterEntry; FILTERS_PER_MODE] = [
    f(-5000, 0, "5.0k"),
    f(-4000, 0, "4.0k"),
    f(-3000, 0, "3.0k"),
    f(-2750, -250, "2.5k"),
    f(-2500, -500, "2.0k"),
    f(-2250, -750, "1.5k"),
    f(-2000, -1000, "1.0k"),
    f(-1875, -1125, "750"),
    f(-1750, -1250, "500"),
    f(-1625, -1375, "250"),
    f(-3000, 0, "Var1"),
    f(-3000, 0, "Var2"),
];

static FILTER_DIGU: [FilterEntry; FILTERS_PER_MODE] = [
    f(0, 5000, "5.0k"),
    f(0, 4000, "4.0k"),
    f(0, 3000, "3.0k"),
    f(250, 2750, "2.5k"),
    f(500, 2500, "2.0k"),
    f(750, 2250, "1.5k"),
    f(1000, 2000, "1.0k"),
    f(1125, 1875, "750"),
    f(1250, 1750, "500"),
    f(1375, 1625, "250"),
    f(0, 3000, "Var1"),
    f(0, 3000, "Var2"),
];

static FILTER_CW: [FilterEntry; FILTERS_PER_MODE] = [
    f(500, 500, "1.0k"),
    f(400, 400, "800"),
    f(375, 375, "750"),
    f(300, 300, "600"),
    f(250, 250, "500"),
    f(200, 200, "400"),
    f(125, 125, "250"),
    f(50, 50, "100"),
    f(25, 25, "50"),
    f(13, 13, "25"),
    f(250, 250, "Var1"),
    f(250, 250, "Var2"),
];

static FILTER_WIDE: [FilterEntry; FILTERS_PER_MODE] = [
    f(-8000, 8000, "16k"),
    f(-6000, 6000, "12k"),
    f(-5000, 5000, "10k"),
    f(-4000, 4000, "8k"),
    f(-3300, 3300, "6.6k"),
    f(-2600, 2600, "5.2k"),
    f(-2000, 2000, "4.0k"),
    f(-1550, 1550, "3.1k"),
    f(-1450, 1450, "2.9k"),
    f(-1200, 1200, "2.4k"),
    f(-3300, 3300, "Var1"),
    f(-3300, 3300, "Var2"),
];

/// The filter table for a mode. AM, SAM, FMN, DSB, SPEC and DRM share the
/// wide table; CWL and CWU share the symmetric CW table.
pub fn filter_table(mode: Mode) -> &'static [FilterEntry; FILTERS_PER_MODE] {
    match mode {
        Mode::Lsb => &FILTER_LSB,
        Mode::Usb => &FILTER_USB,
        Mode::Digl => &FILTER_DIGL,
        Mode::Digu => &FILTER_DIGU,
        Mode::Cwl | Mode::Cwu => &FILTER_CW,
        Mode::Dsb | Mode::Fmn | Mode::Am | Mode::Spec | Mode::Sam | Mode::Drm => &FILTER_WIDE,
    }
}

/// Derive the passband edges from raw table values.
///
/// CW modes shift the table values around the sidetone rather than using
/// them verbatim: for CWL `low = -sidetone - table_low` and
/// `high = -sidetone + table_high`; CWU mirrors the sign of the sidetone.
/// All other modes pass the table values through unchanged. FM is handled
/// by [`passband_for_index`], which never reaches here with `Fmn`.
pub fn passband(mode: Mode, low: i64, high: i64, sidetone: i64) -> (i64, i64) {
    match mode {
        Mode::Cwl => (-sidetone - low, -sidetone + high),
        Mode::Cwu => (sidetone - low, sidetone + high),
        _ => (low, high),
    }
}

/// Derive the passband edges for a filter index, handling the FM special
/// case: FM ignores the table and derives the edges from the configured
/// deviation (2.5 kHz -> +/-4 kHz, 5 kHz -> +/-8 kHz).
pub fn passband_for_index(
    mode: Mode,
    filter_index: usize,
    sidetone: i64,
    deviation: i64,
) -> (i64, i64) {
    if mode == Mode::Fmn {
        return match deviation {
            5000 => (-8000, 8000),
            _ => (-4000, 4000),
        };
    }
    let table = filter_table(mode);
    let entry = &table[filter_index.min(FILTERS_PER_MODE - 1)];
    passband(mode, entry.low, entry.high, sidetone)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cwl_sign_convention() {
        // Worked example: CWL, entry (-250, -250), sidetone 600.
        let (low, high) = passband(Mode::Cwl, -250, -250, 600);
        assert_eq!(low, -350);
        assert_eq!(high, -850);
    }

    #[test]
    fn test_cwl_table_entry() {
        // Real CW table 500 Hz entry (250, 250) with sidetone 600 ends up
        // centered on the lower sidetone.
        let (low, high) = passband_for_index(Mode::Cwl, 4, 600, 2500);
        assert_eq!((low, high), (-850, -350));
    }

    #[test]
    fn test_cwu_table_entry() {
        let (low, high) = passband_for_index(Mode::Cwu, 4, 600, 2500);
        assert_eq!((low, high), (350, 850));
    }

    #[test]
    fn test_derivation_is_pure() {
        let a = passband_for_index(Mode::Cwl, 3, 600, 2500);
        let b = passband_for_index(Mode::Cwl, 3, 600, 2500);
        assert_eq!(a, b);
    }

    #[test]
    fn test_fm_ignores_table() {
        assert_eq!(passband_for_index(Mode::Fmn, 0, 600, 2500), (-4000, 4000));
        assert_eq!(passband_for_index(Mode::Fmn, 0, 600, 5000), (-8000, 8000));
        // Unknown deviation falls back to the narrow edges.
        assert_eq!(passband_for_index(Mode::Fmn, 9, 600, 1234), (-4000, 4000));
    }

    #[test]
    fn test_non_cw_verbatim() {
        let table = filter_table(Mode::Usb);
        let (low, high) = passband_for_index(Mode::Usb, 5, 600, 2500);
        assert_eq!((low, high), (table[5].low, table[5].high));
    }

    #[test]
    fn test_out_of_range_index_clamps() {
        let last = filter_table(Mode::Usb)[FILTERS_PER_MODE - 1];
        let (low, high) = passband_for_index(Mode::Usb, 99, 600, 2500);
        assert_eq!((low, high), (last.low, last.high));
    }
}
