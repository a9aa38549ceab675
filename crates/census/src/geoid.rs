// Block-group GEOID: SSCCCTTTTTTB

use std::fmt;
use std::str::FromStr;

/// A 12-digit block-group identifier split into its parts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockGroupGeoid {
    state: String,
    county: String,
    tract: String,
    block_group: String,
}

impl BlockGroupGeoid {
    pub const LEN: usize = 12;

    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        if s.len() != Self::LEN || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!(
                "GEOID '{}' is not a {}-digit block group identifier",
                s,
                Self::LEN
            ));
        }

        Ok(Self {
            state: s[0..2].to_string(),
            county: s[2..5].to_string(),
            tract: s[5..11].to_string(),
            block_group: s[11..12].to_string(),
        })
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    pub fn county(&self) -> &str {
        &self.county
    }

    pub fn tract(&self) -> &str {
        &self.tract
    }

    pub fn block_group(&self) -> &str {
        &self.block_group
    }
}

impl FromStr for BlockGroupGeoid {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for BlockGroupGeoid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}{}", self.state, self.county, self.tract, self.block_group)
    }
}
