//! The iterative content-refinement engine: bounded-attempt hill-climbing
//! per row, plus the batch runner that feeds it from a CSV and writes the
//! before/after table.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::runtime::Runtime;

use queryfit_core::{parse_score, require_column, resolve_column};
use queryfit_embed::SimilarityScorer;
use queryfit_llm::{extract_candidate, LlmClient, LlmRequest};

use crate::config::RefineConfig;
use crate::ingest::load_table;
use crate::logging;
use crate::model::{CandidateRow, OutputRecord, RefinementOutcome};
use crate::prompt::{build_refine_prompt, REFINE_SYSTEM_PROMPT};

const QUERY_ALIASES: &[&str] = &[
    "Kullanıcı Sorgusu",
    "Sorgu",
    "Query",
    "Search Query",
    "Aranan Sorgu",
];
const MARKUP_ALIASES: &[&str] = &["HTML Kaynağı", "HTML Bölümü", "HTML Section"];
const TEXT_ALIASES: &[&str] = &["Web İçeriği", "İçerik", "Metin", "Content", "Text"];
const SCORE_ALIASES: &[&str] = &[
    "Benzerlik Skoru",
    "Skor",
    "Score",
    "Similarity Score",
    "similarity_score",
];

#[derive(Debug)]
pub struct BatchSummary {
    pub rows: usize,
    pub improved: usize,
    pub output: PathBuf,
}

/// Refines one row. `score` and `generate` are injected so tests can pin
/// both sides; production wires in the similarity scorer and the LLM
/// client. Generation and scoring failures inside an attempt are consumed
/// as failed attempts; only computing the row's starting score can fail.
pub fn try_improve(
    row: &CandidateRow,
    cfg: &RefineConfig,
    score: &impl Fn(&str, &str) -> Result<f32>,
    generate: &impl Fn(Option<&str>, &str) -> Result<String>,
) -> Result<RefinementOutcome> {
    let old_score = match row.prior_score {
        Some(prior) if prior > 0.0 => prior,
        _ => score(&row.query, &row.current_text)
            .context("failed to compute starting similarity")?,
    };
    let mut best_text = row.current_text.clone();
    let mut best_score = old_score;
    let mut attempts = 0u32;

    for attempt in 1..=cfg.max_attempts {
        attempts = attempt;
        logging::verbose(format!(
            "attempt {attempt}/{} baseline={best_score:.4}",
            cfg.max_attempts
        ));
        let user = build_refine_prompt(&row.query, &best_text, &row.markup_context, best_score);
        let raw = match generate(Some(REFINE_SYSTEM_PROMPT), &user) {
            Ok(raw) => raw,
            Err(err) => {
                logging::stage(
                    "refine",
                    format!("generation call failed on attempt {attempt}: {err:#}"),
                );
                throttle(cfg.llm_delay_ms);
                continue;
            }
        };
        throttle(cfg.llm_delay_ms);
        // Malformed or empty responses degrade to a no-op candidate for
        // this attempt; the row itself never aborts.
        let candidate = match extract_candidate(&raw) {
            Ok(candidate) => candidate,
            Err(err) => {
                logging::verbose(format!("attempt {attempt}: {err}; keeping current text"));
                best_text.clone()
            }
        };
        let new_score = match score(&row.query, &candidate) {
            Ok(value) => value,
            Err(err) => {
                logging::stage(
                    "refine",
                    format!("scoring failed on attempt {attempt}: {err:#}"),
                );
                continue;
            }
        };
        if new_score >= best_score * (1.0 + cfg.min_improve) {
            return Ok(RefinementOutcome {
                final_text: candidate,
                old_score,
                new_score,
                change_pct: RefinementOutcome::change_pct(old_score, new_score),
                attempts,
            });
        }
        if new_score > best_score {
            logging::verbose(format!(
                "attempt {attempt}: partial gain {best_score:.4} -> {new_score:.4}, climbing"
            ));
            best_text = candidate;
            best_score = new_score;
        }
    }

    // Budget exhausted: best-so-far, which may be the original text.
    Ok(RefinementOutcome {
        final_text: best_text,
        old_score,
        new_score: best_score,
        change_pct: RefinementOutcome::change_pct(old_score, best_score),
        attempts,
    })
}

/// Runs the whole input through the loop and writes the output CSV.
/// Rows are processed independently, in input order; non-improved rows
/// are retained.
pub fn run_batch(
    cfg: &RefineConfig,
    score: &impl Fn(&str, &str) -> Result<f32>,
    generate: &impl Fn(Option<&str>, &str) -> Result<String>,
    input: &Path,
    output: &Path,
) -> Result<BatchSummary> {
    let started = Instant::now();
    let table = load_table(input)?;
    let c_query = require_column(&table.headers, QUERY_ALIASES, "query")?;
    let c_markup = require_column(&table.headers, MARKUP_ALIASES, "markup-context")?;
    let c_text = require_column(&table.headers, TEXT_ALIASES, "text")?;
    let c_score = resolve_column(&table.headers, SCORE_ALIASES);

    let total = table.rows.len();
    logging::stage(
        "refine",
        format!(
            "starting batch: rows={total} min_improve={} max_attempts={}",
            cfg.min_improve, cfg.max_attempts
        ),
    );

    let mut records = Vec::with_capacity(total);
    let mut improved = 0usize;
    for (idx, cells) in table.rows.iter().enumerate() {
        let row_started = Instant::now();
        let row = CandidateRow {
            query: table.cell(cells, c_query).to_string(),
            markup_context: table.cell(cells, c_markup).to_string(),
            current_text: table.cell(cells, c_text).to_string(),
            prior_score: c_score.map(|col| parse_score(table.cell(cells, col))),
        };
        let outcome = try_improve(&row, cfg, score, generate)?;
        if outcome.change_pct > 0.0 {
            improved += 1;
        }
        logging::stage(
            "refine",
            format!(
                "row {}/{total} tag='{}' old={:.4} new={:.4} (delta={:+.2}%) in {}",
                idx + 1,
                row.markup_context,
                outcome.old_score,
                outcome.new_score,
                outcome.change_pct,
                logging::fmt_duration(row_started.elapsed())
            ),
        );
        records.push(OutputRecord::new(&row, &outcome));
    }

    write_output(output, &records)?;
    logging::stage(
        "refine",
        format!(
            "saved {} (rows kept={total}, improved={improved}) in {}",
            output.display(),
            logging::fmt_duration(started.elapsed())
        ),
    );
    Ok(BatchSummary {
        rows: total,
        improved,
        output: output.to_path_buf(),
    })
}

fn write_output(path: &Path, records: &[OutputRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

fn throttle(delay_ms: u64) {
    if delay_ms > 0 {
        thread::sleep(Duration::from_millis(delay_ms));
    }
}

fn default_output_path(cfg: &RefineConfig, input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("input");
    cfg.output_dir.join(format!("{stem}_refined.csv"))
}

/// Shared entry point for the CLI and YAML-config paths: builds the real
/// scorer and generation client, then hands closures to `run_batch`.
pub fn execute(cfg: RefineConfig, input: &str, output: Option<&str>) -> Result<()> {
    let input = PathBuf::from(input);
    let output = output
        .map(PathBuf::from)
        .unwrap_or_else(|| default_output_path(&cfg, &input));
    let scorer = SimilarityScorer::from_env()?;
    let llm = LlmClient::new(cfg.provider, cfg.model.clone())?;
    logging::info(format!(
        "provider={} model={}",
        llm.provider().as_str(),
        llm.model()
    ));
    let runtime = Runtime::new().context("failed to start tokio runtime")?;
    let score = |a: &str, b: &str| scorer.score(a, b);
    let generate = |system: Option<&str>, user: &str| {
        llm.chat_blocking(
            &runtime,
            &LlmRequest {
                system: system.map(|s| s.to_string()),
                user: user.to_string(),
            },
        )
    };
    run_batch(&cfg, &score, &generate, &input, &output)?;
    Ok(())
}

pub fn run_cli(
    input: String,
    output: Option<String>,
    min_improve: Option<f32>,
    max_attempts: Option<u32>,
    provider: Option<String>,
    model: Option<String>,
) -> Result<()> {
    let cfg = RefineConfig::from_env()?.with_overrides(
        min_improve,
        max_attempts,
        provider.as_deref(),
        model.as_deref(),
    )?;
    execute(cfg, &input, output.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_MAX_ATTEMPTS, DEFAULT_MIN_IMPROVE};
    use queryfit_core::RefineError;
    use std::cell::Cell;
    use std::io::Write;
    use tempfile::tempdir;

    fn test_cfg() -> RefineConfig {
        RefineConfig {
            provider: queryfit_llm::LlmProvider::Local,
            model: "local".into(),
            min_improve: DEFAULT_MIN_IMPROVE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            llm_delay_ms: 0,
            output_dir: PathBuf::from("data/output"),
        }
    }

    fn row(prior: Option<f32>) -> CandidateRow {
        CandidateRow {
            query: "google reklam verme".into(),
            markup_context: "h1".into(),
            current_text: "Reklam vermek için bize ulaşın".into(),
            prior_score: prior,
        }
    }

    fn candidate_json(text: &str) -> String {
        serde_json::json!({ "improved_text": text }).to_string()
    }

    #[test]
    fn first_improving_candidate_is_accepted_on_attempt_one() {
        let mut cfg = test_cfg();
        cfg.min_improve = 0.0;
        let calls = Cell::new(0u32);
        let generate = |_: Option<&str>, _: &str| {
            calls.set(calls.get() + 1);
            Ok(candidate_json("improved"))
        };
        let score = |_: &str, text: &str| Ok(if text == "improved" { 0.9 } else { 0.4 });
        let outcome = try_improve(&row(Some(0.4)), &cfg, &score, &generate).unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(outcome.final_text, "improved");
        assert_eq!(outcome.old_score, 0.4);
        assert_eq!(outcome.new_score, 0.9);
        assert!(outcome.change_pct > 0.0);
    }

    #[test]
    fn never_improving_stub_exhausts_budget_and_keeps_original() {
        let cfg = test_cfg();
        let calls = Cell::new(0u32);
        let generate = |_: Option<&str>, _: &str| {
            calls.set(calls.get() + 1);
            Ok(candidate_json("something worse"))
        };
        let score = |_: &str, text: &str| Ok(if text == "something worse" { 0.1 } else { 0.4 });
        let outcome = try_improve(&row(Some(0.4)), &cfg, &score, &generate).unwrap();
        assert_eq!(calls.get(), DEFAULT_MAX_ATTEMPTS);
        assert_eq!(outcome.final_text, "Reklam vermek için bize ulaşın");
        assert_eq!(outcome.new_score, 0.4);
        assert_eq!(outcome.change_pct, 0.0);
    }

    #[test]
    fn empty_candidate_counts_as_a_failed_attempt() {
        let cfg = test_cfg();
        let calls = Cell::new(0u32);
        let generate = |_: Option<&str>, _: &str| {
            calls.set(calls.get() + 1);
            Ok("no json here at all".to_string())
        };
        let score = |_: &str, _: &str| Ok(0.4f32);
        let outcome = try_improve(&row(Some(0.4)), &cfg, &score, &generate).unwrap();
        assert_eq!(calls.get(), DEFAULT_MAX_ATTEMPTS);
        assert_eq!(outcome.final_text, "Reklam vermek için bize ulaşın");
        assert_eq!(outcome.change_pct, 0.0);
    }

    #[test]
    fn partial_gains_climb_without_lowering_old_score() {
        let mut cfg = test_cfg();
        cfg.min_improve = 1.0; // acceptance requires doubling, so only climb
        let attempt = Cell::new(0u32);
        let generate = |_: Option<&str>, _: &str| {
            attempt.set(attempt.get() + 1);
            Ok(candidate_json(&format!("candidate {}", attempt.get())))
        };
        let score = |_: &str, text: &str| {
            Ok(match text {
                "candidate 1" => 0.5,
                "candidate 2" => 0.6,
                "candidate 3" => 0.55,
                _ => 0.4,
            })
        };
        let outcome = try_improve(&row(Some(0.4)), &cfg, &score, &generate).unwrap();
        assert_eq!(outcome.final_text, "candidate 2");
        assert_eq!(outcome.old_score, 0.4);
        assert_eq!(outcome.new_score, 0.6);
        assert_eq!(outcome.attempts, DEFAULT_MAX_ATTEMPTS);
    }

    #[test]
    fn generation_errors_are_consumed_not_propagated() {
        let cfg = test_cfg();
        let calls = Cell::new(0u32);
        let generate = |_: Option<&str>, _: &str| -> Result<String> {
            calls.set(calls.get() + 1);
            Err(RefineError::Service("connection refused".into()).into())
        };
        let score = |_: &str, _: &str| Ok(0.4f32);
        let outcome = try_improve(&row(Some(0.4)), &cfg, &score, &generate).unwrap();
        assert_eq!(calls.get(), DEFAULT_MAX_ATTEMPTS);
        assert_eq!(outcome.change_pct, 0.0);
    }

    #[test]
    fn missing_prior_score_is_computed_fresh() {
        let cfg = test_cfg();
        let generate = |_: Option<&str>, _: &str| Ok(candidate_json("improved"));
        let score = |_: &str, text: &str| Ok(if text == "improved" { 0.8 } else { 0.3 });
        let outcome = try_improve(&row(None), &cfg, &score, &generate).unwrap();
        assert_eq!(outcome.old_score, 0.3);
        assert_eq!(outcome.new_score, 0.8);
    }

    #[test]
    fn outcome_never_regresses_below_starting_score() {
        let cfg = test_cfg();
        let generate = |_: Option<&str>, _: &str| Ok(candidate_json("anything"));
        let score = |_: &str, text: &str| Ok(if text == "anything" { 0.05 } else { 0.4 });
        let outcome = try_improve(&row(Some(0.4)), &cfg, &score, &generate).unwrap();
        assert!(outcome.new_score >= outcome.old_score);
    }

    #[test]
    fn batch_preserves_row_order_and_percent_scores() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("top10.csv");
        let mut file = std::fs::File::create(&input).unwrap();
        writeln!(file, "HTML Bölümü,Kullanıcı Sorgusu,Web İçeriği,Benzerlik Skoru").unwrap();
        writeln!(file, "h1,google reklam verme,Reklam vermek için,40%").unwrap();
        writeln!(file, "p,ikinci sorgu,ikinci metin,55%").unwrap();
        let output = dir.path().join("out.csv");

        let cfg = test_cfg();
        let generate = |_: Option<&str>, _: &str| Ok(candidate_json("daha iyi metin"));
        let score = |_: &str, text: &str| Ok(if text == "daha iyi metin" { 0.9 } else { 0.2 });
        let summary = run_batch(&cfg, &score, &generate, &input, &output).unwrap();
        assert_eq!(summary.rows, 2);
        assert_eq!(summary.improved, 2);

        let written = std::fs::read_to_string(&output).unwrap();
        let mut lines = written.lines();
        assert_eq!(
            lines.next().unwrap(),
            "HTML Section,Query,Old Text,New Text,Old Score,New Score,Change Pct"
        );
        let first = lines.next().unwrap();
        assert!(first.starts_with("h1,google reklam verme,"));
        assert!(first.contains("0.4")); // "40%" normalized
        assert!(first.contains("daha iyi metin"));
        let second = lines.next().unwrap();
        assert!(second.starts_with("p,ikinci sorgu,"));
        assert!(second.contains("0.55"));
    }

    #[test]
    fn batch_with_empty_candidates_keeps_all_rows_unchanged() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in.csv");
        let mut file = std::fs::File::create(&input).unwrap();
        writeln!(file, "HTML Section,Query,Content,Score").unwrap();
        writeln!(file, "h1,google reklam verme,Reklam vermek için,40%").unwrap();
        let output = dir.path().join("out.csv");

        let cfg = test_cfg();
        let calls = Cell::new(0u32);
        let generate = |_: Option<&str>, _: &str| {
            calls.set(calls.get() + 1);
            Ok(candidate_json(""))
        };
        let score = |_: &str, _: &str| Ok(0.4f32);
        let summary = run_batch(&cfg, &score, &generate, &input, &output).unwrap();
        assert_eq!(summary.rows, 1);
        assert_eq!(summary.improved, 0);
        assert_eq!(calls.get(), DEFAULT_MAX_ATTEMPTS);

        let written = std::fs::read_to_string(&output).unwrap();
        let data_line = written.lines().nth(1).unwrap();
        assert!(data_line.contains("Reklam vermek için"));
        assert!(data_line.trim_end().ends_with("0.0"));
    }

    #[test]
    fn batch_without_score_column_computes_priors() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in.csv");
        let mut file = std::fs::File::create(&input).unwrap();
        writeln!(file, "HTML Section,Query,Content").unwrap();
        writeln!(file, "p,some query,some text").unwrap();
        let output = dir.path().join("out.csv");

        let cfg = test_cfg();
        let generate = |_: Option<&str>, _: &str| Ok(candidate_json("better text"));
        let score = |_: &str, text: &str| Ok(if text == "better text" { 0.7 } else { 0.3 });
        let summary = run_batch(&cfg, &score, &generate, &input, &output).unwrap();
        assert_eq!(summary.improved, 1);
        let written = std::fs::read_to_string(&output).unwrap();
        assert!(written.lines().nth(1).unwrap().contains("0.3"));
    }

    #[test]
    fn missing_mandatory_column_fails_fast() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in.csv");
        let mut file = std::fs::File::create(&input).unwrap();
        writeln!(file, "HTML Section,Content").unwrap();
        writeln!(file, "p,text").unwrap();
        let output = dir.path().join("out.csv");

        let cfg = test_cfg();
        let generate = |_: Option<&str>, _: &str| Ok(String::new());
        let score = |_: &str, _: &str| Ok(0.0f32);
        let err = run_batch(&cfg, &score, &generate, &input, &output).unwrap_err();
        let refine_err = err.downcast_ref::<RefineError>().unwrap();
        assert!(matches!(refine_err, RefineError::Schema { field: "query" }));
        assert!(!output.exists());
    }

    #[test]
    fn default_output_path_derives_from_input_stem() {
        let cfg = test_cfg();
        let path = default_output_path(&cfg, Path::new("data/input/top10.csv"));
        assert_eq!(path, Path::new("data/output/top10_refined.csv"));
    }
}
