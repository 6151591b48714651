use building_types::Fingerprint;
use geometry::Abs;

/// Glyph measurements used for line breaking.
pub trait Metrics: Send + Sync {
    /// The horizontal advance of a character at the given font size.
    fn advance(&self, character: char, size: Abs) -> Abs;

    /// Identifies the metrics in cache keys.
    fn fingerprint(&self) -> Fingerprint;

    fn measure(&self, text: &str, size: Abs) -> Abs {
        text.chars().map(|character| self.advance(character, size)).sum()
    }
}

/// Deterministic metrics that classify characters by rough width.
///
/// Advances are given in thousandths of the font size.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonoMetrics;

impl MonoMetrics {
    fn per_mille(character: char) -> i64 {
        match character {
            ' ' => 333,
            'i' | 'j' | 'l' | 't' | 'f' | 'I' | '.' | ',' | ':' | ';' | '!' | '\'' | '|' => 278,
            'm' | 'w' | 'M' | 'W' => 833,
            'A'..='Z' => 667,
            '\u{1100}'..='\u{115f}' | '\u{2e80}'..='\u{a4cf}' | '\u{ac00}'..='\u{d7a3}' => 1000,
            '\u{f900}'..='\u{faff}' | '\u{ff00}'..='\u{ff60}' => 1000,
            _ => 500,
        }
    }
}

impl Metrics for MonoMetrics {
    fn advance(&self, character: char, size: Abs) -> Abs {
        size.scale(MonoMetrics::per_mille(character), 1000)
    }

    fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of("mono")
    }
}

#[cfg(test)]
mod tests {
    use geometry::Abs;

    use super::{Metrics, MonoMetrics};

    #[test]
    fn test_advances() {
        let size = Abs::pt(10);
        assert_eq!(MonoMetrics.advance('a', size), Abs::pt(5));
        assert_eq!(MonoMetrics.advance('W', size), size.scale(833, 1000));
        assert_eq!(MonoMetrics.advance('漢', size), size);
        assert_eq!(MonoMetrics.measure("ab", size), Abs::pt(10));
    }
}
