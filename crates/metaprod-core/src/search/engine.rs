//! Search sub-engines and the artifact each one is expected to produce.

use serde::{Deserialize, Serialize};

/// A database search engine driven by the search step.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum SearchEngine {
    XTandem,
    MsgfPlus,
    Omssa,
    Comet,
    MetaMorpheus,
    MyriMatch,
    Sage,
}

impl SearchEngine {
    pub const ALL: [SearchEngine; 7] = [
        SearchEngine::XTandem,
        SearchEngine::MsgfPlus,
        SearchEngine::Omssa,
        SearchEngine::Comet,
        SearchEngine::MetaMorpheus,
        SearchEngine::MyriMatch,
        SearchEngine::Sage,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SearchEngine::XTandem => "xtandem",
            SearchEngine::MsgfPlus => "msgfplus",
            SearchEngine::Omssa => "omssa",
            SearchEngine::Comet => "comet",
            SearchEngine::MetaMorpheus => "metamorpheus",
            SearchEngine::MyriMatch => "myrimatch",
            SearchEngine::Sage => "sage",
        }
    }

    /// Switch name understood by the search front end (`-<flag> 0|1`).
    pub fn flag(self) -> &'static str {
        match self {
            SearchEngine::XTandem => "xtandem",
            SearchEngine::MsgfPlus => "msgf",
            SearchEngine::Omssa => "omssa",
            SearchEngine::Comet => "comet",
            SearchEngine::MetaMorpheus => "meta_morpheus",
            SearchEngine::MyriMatch => "myrimatch",
            SearchEngine::Sage => "sage",
        }
    }

    /// Name of the compressed result file this engine adds to the search
    /// archive for the input `filename` (file stem).
    pub fn artifact(self, filename: &str) -> String {
        let suffix = match self {
            SearchEngine::XTandem => "t.xml.gz",
            SearchEngine::MsgfPlus => "msgf.mzid.gz",
            SearchEngine::Omssa => "omx.gz",
            SearchEngine::Comet => "comet.pep.xml.gz",
            SearchEngine::MetaMorpheus => "mzID.gz",
            SearchEngine::MyriMatch => "myrimatch.mzid.gz",
            SearchEngine::Sage => "sage.tsv.gz",
        };
        format!("{}.{}", filename, suffix)
    }
}

impl std::fmt::Display for SearchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SearchEngine {
    type Err = metaprod_common::MetaprodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "xtandem" | "x!tandem" => Ok(SearchEngine::XTandem),
            "msgf" | "msgfplus" | "ms-gf+" => Ok(SearchEngine::MsgfPlus),
            "omssa" => Ok(SearchEngine::Omssa),
            "comet" => Ok(SearchEngine::Comet),
            "metamorpheus" | "meta_morpheus" => Ok(SearchEngine::MetaMorpheus),
            "myrimatch" => Ok(SearchEngine::MyriMatch),
            "sage" => Ok(SearchEngine::Sage),
            _ => Err(metaprod_common::MetaprodError::invalid("search engine", s)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_names() {
        assert_eq!(SearchEngine::MsgfPlus.artifact("run01"), "run01.msgf.mzid.gz");
        assert_eq!(SearchEngine::Comet.artifact("run01"), "run01.comet.pep.xml.gz");
        assert_eq!(SearchEngine::Omssa.artifact("run01"), "run01.omx.gz");
        assert_eq!(SearchEngine::XTandem.artifact("run01"), "run01.t.xml.gz");
        assert_eq!(SearchEngine::MyriMatch.artifact("run01"), "run01.myrimatch.mzid.gz");
        assert_eq!(SearchEngine::MetaMorpheus.artifact("run01"), "run01.mzID.gz");
        assert_eq!(SearchEngine::Sage.artifact("run01"), "run01.sage.tsv.gz");
    }

    #[test]
    fn test_parse_engine_names() {
        assert_eq!("MSGF".parse::<SearchEngine>().unwrap(), SearchEngine::MsgfPlus);
        assert_eq!("meta_morpheus".parse::<SearchEngine>().unwrap(), SearchEngine::MetaMorpheus);
        assert!("mascot".parse::<SearchEngine>().is_err());
    }

    #[test]
    fn test_artifacts_are_distinct() {
        let mut names: Vec<_> = SearchEngine::ALL.iter().map(|e| e.artifact("x")).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), SearchEngine::ALL.len());
    }
}
