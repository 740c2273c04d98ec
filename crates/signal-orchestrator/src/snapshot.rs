use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use signal_core::{EngineError, MarketRegime, Rejection, Setup};

/// Per-stage rejection tally, ordered for stable serialization.
pub type StageCounts = BTreeMap<String, usize>;

/// One immutable record per run, written to the run-log directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub timestamp: DateTime<Utc>,
    pub config_digest: String,
    pub universe_digest: String,
    pub regime: MarketRegime,
    pub breadth: f64,
    pub partial: bool,
    pub universe_size: usize,
    pub analyzed: usize,
    pub rejections_by_stage: StageCounts,
    pub setups: Vec<Setup>,
    pub rejections: Vec<Rejection>,
}

impl RunSnapshot {
    pub fn stage_counts(rejections: &[Rejection]) -> StageCounts {
        let mut counts = StageCounts::new();
        for rejection in rejections {
            *counts.entry(rejection.stage.name().to_string()).or_insert(0) += 1;
        }
        counts
    }
}

/// Write the snapshot as `run_<timestamp>.json` under `dir`, via a temp
/// file and an atomic rename so readers never observe a torn snapshot.
pub fn write_snapshot(dir: &Path, snapshot: &RunSnapshot) -> Result<PathBuf, EngineError> {
    std::fs::create_dir_all(dir).map_err(|e| {
        EngineError::data(format!("cannot create run-log dir {}: {e}", dir.display()))
    })?;

    let name = format!("run_{}.json", snapshot.timestamp.format("%Y%m%dT%H%M%S%.3fZ"));
    let path = dir.join(&name);
    let tmp = dir.join(format!("{name}.tmp"));

    let raw = serde_json::to_vec_pretty(snapshot)
        .map_err(|e| EngineError::data(format!("cannot serialize snapshot: {e}")))?;
    std::fs::write(&tmp, raw)
        .map_err(|e| EngineError::data(format!("cannot write {}: {e}", tmp.display())))?;
    std::fs::rename(&tmp, &path)
        .map_err(|e| EngineError::data(format!("cannot rename into {}: {e}", path.display())))?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use signal_core::RejectionStage;

    fn snapshot() -> RunSnapshot {
        let rejections = vec![
            Rejection::new("A.ST", RejectionStage::Context, "not_declined", ""),
            Rejection::new("B.ST", RejectionStage::Context, "not_declined", ""),
            Rejection::new("C.ST", RejectionStage::Data, "fetch_failed", "boom"),
        ];
        RunSnapshot {
            timestamp: Utc.with_ymd_and_hms(2025, 6, 27, 18, 0, 0).unwrap(),
            config_digest: "cfg".into(),
            universe_digest: "uni".into(),
            regime: MarketRegime::Healthy,
            breadth: 0.6,
            partial: false,
            universe_size: 3,
            analyzed: 3,
            rejections_by_stage: RunSnapshot::stage_counts(&rejections),
            setups: vec![],
            rejections,
        }
    }

    #[test]
    fn stage_counts_aggregate() {
        let snap = snapshot();
        assert_eq!(snap.rejections_by_stage.get("context"), Some(&2));
        assert_eq!(snap.rejections_by_stage.get("data"), Some(&1));
    }

    #[test]
    fn snapshot_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let snap = snapshot();
        let path = write_snapshot(dir.path(), &snap).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let loaded: RunSnapshot = serde_json::from_str(&raw).unwrap();
        assert_eq!(loaded.universe_digest, snap.universe_digest);
        assert_eq!(loaded.rejections.len(), 3);
        assert!(!dir.path().join(format!(
            "run_{}.json.tmp",
            snap.timestamp.format("%Y%m%dT%H%M%S%.3fZ")
        )).exists());
    }
}
