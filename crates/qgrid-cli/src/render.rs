//! Text rendering of the grid, the learned values and the agent's stats

use std::fmt::Write;

use qgrid_core::Cell;
use qgrid_rl::{heatmap_intensity, EvaluationReport, GridEnvironment, QTable, Rollout, Snapshot};

/// Shades from coldest to hottest best value
const SHADES: [char; 5] = [' ', '.', ':', '+', '#'];

fn shade(best_value: f64) -> char {
    let intensity = heatmap_intensity(best_value);
    let index = (intensity * (SHADES.len() - 1) as f64).round() as usize;
    SHADES[index.min(SHADES.len() - 1)]
}

/// Draw the grid: `A` agent, `G` goal, `X` hazard, otherwise the greedy
/// arrow (`?` when unvisited) followed by the heatmap shade.
pub fn grid(env: &GridEnvironment, table: &QTable, agent: Option<Cell>) -> String {
    let values = table.value_grid(env.size());
    let mut out = String::new();

    for y in 0..env.size() {
        for x in 0..env.size() {
            let cell = Cell::new(x, y);
            let symbol = if Some(cell) == agent {
                'A'
            } else if cell == env.goal() {
                'G'
            } else if env.is_hazard(cell) {
                'X'
            } else {
                table.best_action(cell).map_or('?', |a| a.arrow())
            };
            let heat = if env.is_terminal(cell) {
                ' '
            } else {
                shade(values[[y, x]])
            };
            let _ = write!(out, "[{symbol}{heat}]");
        }
        out.push('\n');
    }

    out
}

/// One-line stats for a snapshot
pub fn stats(snapshot: &Snapshot) -> String {
    let action = if snapshot.was_exploration {
        "random"
    } else {
        "best"
    };
    let mut line = format!(
        "episode {:>4} | step {:>6} | reward {:>8.1} | epsilon {:>3.0}% | action {action}",
        snapshot.episode_count,
        snapshot.total_steps,
        snapshot.cumulative_reward,
        snapshot.epsilon * 100.0,
    );
    if snapshot.mastered {
        line.push_str(" | training complete");
    }
    line
}

/// The cells of a rollout as `(0, 0) -> (1, 0) -> ...`
pub fn path(rollout: &Rollout) -> String {
    rollout
        .path
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

pub fn evaluation(report: &EvaluationReport) -> String {
    format!(
        "{} rollouts: {} reached goal, {} hit hazard, {} timed out ({:.1}% success, mean length {:.1})",
        report.rollouts,
        report.successes,
        report.hazards,
        report.timeouts,
        report.success_rate * 100.0,
        report.mean_path_length,
    )
}
