//! Frame index resolution for channels.

use indexmap::IndexMap;
use loaddata_types::SampleRow;

/// Channel ordering for one sample row, resolved against a canonical channel set.
///
/// The row's own acquisition order wins; the canonical set is the fallback for entries the row
/// never acquired (illumination functions, derived channels). Build one per row: acquisition
/// order differs between samples.
#[derive(Debug, Clone)]
pub struct ChannelOrder<'a> {
    canonical: &'a [String],
    acquired: Vec<String>,
}

impl<'a> ChannelOrder<'a> {
    /// Order for `sample`, renaming acquired channels through `channel_map` when one applies.
    pub fn for_sample(canonical: &'a [String], sample: &SampleRow, channel_map: Option<&IndexMap<String, String>>) -> Self {
        let acquired = sample
            .channel_list()
            .into_iter()
            .map(|channel| {
                channel_map
                    .and_then(|map| map.get(channel))
                    .map(String::as_str)
                    .unwrap_or(channel)
                    .to_string()
            })
            .collect();
        Self { canonical, acquired }
    }

    /// Frame index of `channel`: its position in the row, else in the canonical set, else 0.
    pub fn resolve(&self, channel: &str) -> usize {
        self.acquired
            .iter()
            .position(|candidate| candidate == channel)
            .or_else(|| self.canonical.iter().position(|candidate| candidate == channel))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(channels: &str) -> SampleRow {
        SampleRow {
            path: "/images/image.tiff".into(),
            arm: "barcoding".into(),
            batch: "Batch1".into(),
            plate: "Plate1".into(),
            well: "A1".into(),
            channels: channels.into(),
            site: 0,
            cycle: 1,
            n_frames: 5,
            extra: IndexMap::new(),
        }
    }

    fn canonical() -> Vec<String> {
        ["DNA", "A", "C", "T", "G"].into_iter().map(String::from).collect()
    }

    #[test]
    fn row_order_wins_over_canonical() {
        let canonical = canonical();
        let order = ChannelOrder::for_sample(&canonical, &sample("A,DNA,T"), None);
        assert_eq!(order.resolve("DNA"), 1);
        assert_eq!(order.resolve("T"), 2);
    }

    #[test]
    fn absent_channel_falls_back_to_canonical_position() {
        let canonical = canonical();
        let order = ChannelOrder::for_sample(&canonical, &sample("A,DNA,T"), None);
        assert_eq!(order.resolve("G"), 4);
        assert_eq!(order.resolve("Unknown"), 0);
    }

    #[test]
    fn channel_map_renames_acquired_channels() {
        let canonical = canonical();
        let map = IndexMap::from([("DAPI".to_string(), "DNA".to_string())]);
        let order = ChannelOrder::for_sample(&canonical, &sample("C,A,T,G,DAPI"), Some(&map));
        assert_eq!(order.resolve("DNA"), 4);
        assert_eq!(order.resolve("C"), 0);
    }
}
