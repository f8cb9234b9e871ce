use thermal_api::{OccupancyResult, PluginError, RecordCodec};

/// RecordCodec для wire-формата `{"occupied": bool, "grid": [[number, ..], ..]}`.
///
/// Числа пишутся в кратчайшем представлении, которое читается обратно
/// в тот же f64, поэтому encode → decode не теряет точность.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl RecordCodec for JsonCodec {
    fn encode(&self, result: &OccupancyResult) -> Result<Vec<u8>, PluginError> {
        Ok(serde_json::to_vec(result)?)
    }

    fn decode(&self, data: &[u8]) -> Result<OccupancyResult, PluginError> {
        let s = std::str::from_utf8(data)?;
        Ok(serde_json::from_str(s)?)
    }
}
