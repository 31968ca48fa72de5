use once_cell::sync::Lazy;
use std::collections::HashMap;

/// NEM region identifier as stored in the forecast tables (e.g. "NSW1")
pub type RegionId = String;

/// A market region of the National Electricity Market
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketRegion {
    pub id: &'static str,
    pub short_name: &'static str,
}

impl MarketRegion {
    pub const fn new(id: &'static str, short_name: &'static str) -> Self {
        Self { id, short_name }
    }
}

/// Regions in the order charts list them
pub static MARKET_REGIONS: [MarketRegion; 5] = [
    MarketRegion::new("NSW1", "NSW"),
    MarketRegion::new("QLD1", "QLD"),
    MarketRegion::new("SA1", "SA"),
    MarketRegion::new("VIC1", "VIC"),
    MarketRegion::new("TAS1", "TAS"),
];

static REGIONS_BY_ID: Lazy<HashMap<&'static str, (usize, &'static MarketRegion)>> =
    Lazy::new(|| {
        MARKET_REGIONS
            .iter()
            .enumerate()
            .map(|(rank, region)| (region.id, (rank, region)))
            .collect()
    });

/// Get a region by its market identifier
pub fn get_region(id: &str) -> Option<&'static MarketRegion> {
    REGIONS_BY_ID.get(id).map(|(_, region)| *region)
}

/// Label used for a region in chart legends. Unknown ids are shown as-is.
pub fn display_name(id: &str) -> String {
    get_region(id)
        .map(|region| region.short_name.to_string())
        .unwrap_or_else(|| id.to_string())
}

/// Sort key placing known regions in market order and unknown ones after, alphabetically
pub fn sort_key(id: &str) -> (usize, String) {
    match REGIONS_BY_ID.get(id) {
        Some((rank, _)) => (*rank, String::new()),
        None => (MARKET_REGIONS.len(), id.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("NSW1"), "NSW");
        assert_eq!(display_name("TAS1"), "TAS");
        assert_eq!(display_name("SNOWY1"), "SNOWY1");
    }

    #[test]
    fn test_sort_key_orders_known_regions_first() {
        let mut ids = vec!["ZZZ1", "VIC1", "SNOWY1", "NSW1", "SA1"];
        ids.sort_by_key(|id| sort_key(id));
        assert_eq!(ids, vec!["NSW1", "SA1", "VIC1", "SNOWY1", "ZZZ1"]);
    }

    #[test]
    fn test_get_region() {
        assert_eq!(get_region("QLD1").map(|r| r.short_name), Some("QLD"));
        assert!(get_region("SNOWY1").is_none());
    }
}
