// Census geography levels: display name <-> TIGER/Line code

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeographyLevel {
    States,
    Counties,
    CountySubdivisions,
    StateLegislativeUpper,
    StateLegislativeLower,
    CombinedStatisticalAreas,
    CensusTracts,
    CensusBlockGroups,
    CensusBlocks,
    CongressionalDistricts,
    IncorporatedPlaces,
    CensusDesignatedPlaces,
    ZipCodeTabulationAreas,
}

impl GeographyLevel {
    pub const ALL: [GeographyLevel; 13] = [
        GeographyLevel::States,
        GeographyLevel::Counties,
        GeographyLevel::CountySubdivisions,
        GeographyLevel::StateLegislativeUpper,
        GeographyLevel::StateLegislativeLower,
        GeographyLevel::CombinedStatisticalAreas,
        GeographyLevel::CensusTracts,
        GeographyLevel::CensusBlockGroups,
        GeographyLevel::CensusBlocks,
        GeographyLevel::CongressionalDistricts,
        GeographyLevel::IncorporatedPlaces,
        GeographyLevel::CensusDesignatedPlaces,
        GeographyLevel::ZipCodeTabulationAreas,
    ];

    /// Name as it appears in geocoder responses.
    pub fn name(&self) -> &'static str {
        match self {
            GeographyLevel::States => "States",
            GeographyLevel::Counties => "Counties",
            GeographyLevel::CountySubdivisions => "County Subdivisions",
            GeographyLevel::StateLegislativeUpper => "State Legislative Districts - Upper",
            GeographyLevel::StateLegislativeLower => "State Legislative Districts - Lower",
            GeographyLevel::CombinedStatisticalAreas => "Combined Statistical Areas",
            GeographyLevel::CensusTracts => "Census Tracts",
            GeographyLevel::CensusBlockGroups => "Census Block Groups",
            GeographyLevel::CensusBlocks => "Census Blocks",
            GeographyLevel::CongressionalDistricts => "Congressional Districts",
            GeographyLevel::IncorporatedPlaces => "Incorporated Places",
            GeographyLevel::CensusDesignatedPlaces => "Census Designated Places",
            GeographyLevel::ZipCodeTabulationAreas => "Zip Code Tabulation Areas",
        }
    }

    /// TIGER/Line directory code.
    pub fn code(&self) -> &'static str {
        match self {
            GeographyLevel::States => "STATE",
            GeographyLevel::Counties => "COUNTY",
            GeographyLevel::CountySubdivisions => "CCD",
            GeographyLevel::StateLegislativeUpper => "SLDU",
            GeographyLevel::StateLegislativeLower => "SLDL",
            GeographyLevel::CombinedStatisticalAreas => "CSA",
            GeographyLevel::CensusTracts => "TRACT",
            GeographyLevel::CensusBlockGroups => "BG",
            GeographyLevel::CensusBlocks => "BLOCK",
            GeographyLevel::CongressionalDistricts => "CONG",
            GeographyLevel::IncorporatedPlaces => "INCP",
            GeographyLevel::CensusDesignatedPlaces => "CDP",
            GeographyLevel::ZipCodeTabulationAreas => "ZCTA",
        }
    }

    /// Exact display-name lookup.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|level| level.name() == name)
    }

    /// Code lookup, case-insensitive.
    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|level| level.code().eq_ignore_ascii_case(code))
    }

    /// Whether the address geocoder can return this level.
    pub fn is_geocodable(&self) -> bool {
        !matches!(
            self,
            GeographyLevel::CensusBlockGroups | GeographyLevel::ZipCodeTabulationAreas
        )
    }

    pub fn geocodable() -> impl Iterator<Item = GeographyLevel> {
        Self::ALL.into_iter().filter(GeographyLevel::is_geocodable)
    }
}

impl fmt::Display for GeographyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Strip a leading ordinal token: "2020 Census Blocks" -> "Census Blocks".
/// Keys that do not start with a digit are returned unchanged.
pub fn normalize_geography_key(key: &str) -> &str {
    if key.starts_with(|c: char| c.is_ascii_digit()) {
        match key.find(' ') {
            Some(idx) => &key[idx + 1..],
            None => key,
        }
    } else {
        key
    }
}
