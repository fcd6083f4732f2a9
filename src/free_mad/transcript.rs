//! Transcript persistence: writes a completed [`RunResult`] to disk as a
//! timestamp-named JSON or Markdown file.

use crate::free_mad::error::FreeMadError;
use crate::free_mad::types::RunResult;
use chrono::Local;
use std::path::PathBuf;

/// Serializes `result` to `dir/transcript-YYYYMMDD-HHMMSS.{json,md}` and
/// returns the path written. `format` is `"json"` or anything else, which
/// is treated as the Markdown variant (matching the reference writer's
/// fallback behavior).
pub fn save_transcript(result: &RunResult, format: &str, dir: &str) -> Result<PathBuf, FreeMadError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| FreeMadError::Config(format!("failed to create transcript dir {}: {}", dir, e)))?;

    let timestamp = Local::now().format("%Y%m%d-%H%M%S").to_string();
    let body = serde_json::to_string_pretty(result)
        .map_err(|e| FreeMadError::Config(format!("failed to serialize transcript: {}", e)))?;

    if format == "json" {
        let path = PathBuf::from(dir).join(format!("transcript-{}.json", timestamp));
        std::fs::write(&path, body)
            .map_err(|e| FreeMadError::Config(format!("failed to write {}: {}", path.display(), e)))?;
        Ok(path)
    } else {
        let path = PathBuf::from(dir).join(format!("transcript-{}.md", timestamp));
        let markdown = format!(
            "# FREE-MAD Run {timestamp}\n\nFinal answer id: {final_id}\nWinning agents: {winners}\n\n## Transcript (JSON)\n```json\n{body}\n```\n",
            timestamp = timestamp,
            final_id = result.final_answer_id,
            winners = result.winning_agents.join(", "),
            body = body,
        );
        std::fs::write(&path, markdown)
            .map_err(|e| FreeMadError::Config(format!("failed to write {}: {}", path.display(), e)))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::free_mad::types::Metrics;
    use std::collections::HashMap;

    fn sample_result() -> RunResult {
        RunResult {
            final_answer_id: "ans1".to_string(),
            final_solution: "solution text".to_string(),
            scores: HashMap::new(),
            raw_scores: HashMap::new(),
            winning_agents: vec!["a1".to_string(), "a2".to_string()],
            origin_agents: vec!["a1".to_string()],
            holders_history: HashMap::new(),
            early_stop_reason: None,
            transcript: Vec::new(),
            validation: HashMap::new(),
            validator_confidence: HashMap::new(),
            score_explainers: HashMap::new(),
            metrics: Metrics::default(),
        }
    }

    #[test]
    fn writes_json_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_transcript(&sample_result(), "json", dir.path().to_str().unwrap()).unwrap();
        assert!(path.exists());
        assert_eq!(path.extension().unwrap(), "json");
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("ans1"));
    }

    #[test]
    fn writes_markdown_transcript_with_summary_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_transcript(&sample_result(), "markdown", dir.path().to_str().unwrap()).unwrap();
        assert_eq!(path.extension().unwrap(), "md");
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("Final answer id: ans1"));
        assert!(contents.contains("Winning agents: a1, a2"));
    }
}
