use std::path::PathBuf;

use building::EngineConfig;
use clap::{Parser, ValueEnum};
use geometry::{Abs, LengthError, Margins, PageGeometry};
use layout::{Breaking, LayoutConfig};
use tracing::level_filters::LevelFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Lengths given in `em` are relative to the default font size.
const EM: Abs = Abs::pt(10);

fn length(text: &str) -> Result<Abs, LengthError> {
    geometry::parse_length(text, EM)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Paper {
    A4,
    Letter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LineBreaking {
    Greedy,
    Optimal,
}

#[derive(Debug, Parser)]
#[command(name = "folio", about, version(VERSION))]
pub struct Config {
    #[arg(required = true, value_name("FILE"), help("Documents to compile"))]
    pub files: Vec<PathBuf>,
    #[arg(long, value_enum, default_value("a4"))]
    pub paper: Paper,
    #[arg(long, value_name("Length"), value_parser = length, default_value("72pt"))]
    pub margin: Abs,
    #[arg(long, value_name("Length"), value_parser = length, default_value("10pt"))]
    pub font_size: Abs,
    #[arg(long, value_enum, default_value("optimal"))]
    pub breaking: LineBreaking,
    #[arg(long, default_value_t = 4096, help("Entries kept by each shared cache"))]
    pub cache_capacity: usize,
    #[arg(long, help("Print the contents of every page"))]
    pub pages: bool,
    #[arg(long, help("Print log path"))]
    pub log_file: bool,
    #[arg(
        long,
        value_name("LevelFilter"),
        help("Log level for the query engine"),
        default_value("off")
    )]
    pub query_log: LevelFilter,
    #[arg(
        long,
        value_name("LevelFilter"),
        help("Log level for the compiler"),
        default_value("info")
    )]
    pub log: LevelFilter,
}

impl Config {
    pub fn layout_config(&self) -> LayoutConfig {
        let size = match self.paper {
            Paper::A4 => PageGeometry::A4,
            Paper::Letter => PageGeometry::LETTER,
        };
        let breaking = match self.breaking {
            LineBreaking::Greedy => Breaking::Greedy,
            LineBreaking::Optimal => Breaking::Optimal,
        };
        LayoutConfig {
            geometry: PageGeometry::new(size, Margins::uniform(self.margin)),
            font_size: self.font_size,
            leading: self.font_size.scale(6, 5),
            paragraph_spacing: self.font_size.scale(3, 5),
            breaking,
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig { cache_capacity: self.cache_capacity, ..EngineConfig::default() }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use geometry::{Abs, PageGeometry};
    use layout::{Breaking, LayoutConfig};

    use super::Config;

    #[test]
    fn test_defaults_match_layout_defaults() {
        let config = Config::try_parse_from(["folio", "main.fol"]).unwrap();
        assert_eq!(config.layout_config(), LayoutConfig::default());
        assert_eq!(config.engine_config().cache_capacity, 4096);
    }

    #[test]
    fn test_layout_flags() {
        let config = Config::try_parse_from([
            "folio",
            "main.fol",
            "--paper",
            "letter",
            "--margin",
            "2em",
            "--breaking",
            "greedy",
        ])
        .unwrap();
        let layout = config.layout_config();
        assert_eq!(layout.geometry.size, PageGeometry::LETTER);
        assert_eq!(layout.geometry.margins.left, Abs::pt(20));
        assert_eq!(layout.breaking, Breaking::Greedy);
    }

    #[test]
    fn test_invalid_length() {
        let result = Config::try_parse_from(["folio", "main.fol", "--margin", "wide"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_requires_files() {
        assert!(Config::try_parse_from(["folio"]).is_err());
    }
}
