use std::fmt::Write as _;

use signal_core::RRR_NO_LOSS_SENTINEL;
use signal_orchestrator::RunOutcome;

/// Plain-text run report: regime, stage counts and the ranked setups
/// with their diagnostics. Each multiplicative penalty or sizing note
/// that fired is listed as a warning under its setup.
pub fn render(outcome: &RunOutcome) -> String {
    let mut out = String::new();

    writeln!(out, "POSITION TRADING SIGNAL RUN").unwrap();
    writeln!(out, "===========================").unwrap();
    writeln!(out, "Regime: {}", outcome.regime.reasoning).unwrap();
    if outcome.partial {
        writeln!(out, "NOTE: run was cancelled; results cover a partial universe").unwrap();
    }
    writeln!(out).unwrap();

    writeln!(
        out,
        "Universe {} | analysed {} | setups {} | rejected {}",
        outcome.universe_size,
        outcome.analyzed,
        outcome.setups.len(),
        outcome.rejections.len()
    )
    .unwrap();

    let counts = outcome.stage_counts();
    if !counts.is_empty() {
        let per_stage: Vec<String> = counts.iter().map(|(k, v)| format!("{k}: {v}")).collect();
        writeln!(out, "Rejections by stage: {}", per_stage.join(", ")).unwrap();
    }
    writeln!(out).unwrap();

    if outcome.setups.is_empty() {
        writeln!(out, "No setups survived the filters.").unwrap();
        return out;
    }

    for (rank, setup) in outcome.setups.iter().enumerate() {
        writeln!(
            out,
            "#{} {} [{}] score {:.1}",
            rank + 1,
            setup.ticker,
            setup.tier.name(),
            setup.score
        )
        .unwrap();
        writeln!(
            out,
            "   pattern {} | n={} | win rate {:.1}% (CI {:.1}%..{:.1}%)",
            setup.pattern_name,
            setup.sample_size,
            setup.win_rate * 100.0,
            setup.win_rate_ci_lower * 100.0,
            setup.win_rate_ci_upper * 100.0
        )
        .unwrap();

        let rrr = if setup.risk_reward == RRR_NO_LOSS_SENTINEL {
            "sentinel (no losses observed)".to_string()
        } else {
            format!("{:.1}", setup.risk_reward)
        };
        writeln!(
            out,
            "   edge {:.2}% | net {:.2}% | R/R {} | robust {:.0}",
            setup.expected_value * 100.0,
            setup.net_edge * 100.0,
            rrr,
            setup.robust_score
        )
        .unwrap();

        let edges: Vec<String> = setup
            .horizon_edges
            .iter()
            .map(|e| format!("{}d {:+.1}%", e.horizon, e.edge * 100.0))
            .collect();
        writeln!(out, "   horizons: {}", edges.join(" | ")).unwrap();

        writeln!(
            out,
            "   position {:.2}% ({:.0}) | stop {:.1}%",
            setup.position_pct * 100.0,
            setup.position_currency,
            setup.stop_loss_pct * 100.0
        )
        .unwrap();

        for note in &setup.notes {
            writeln!(out, "   ! {note}").unwrap();
        }
        writeln!(out).unwrap();
    }

    out
}
