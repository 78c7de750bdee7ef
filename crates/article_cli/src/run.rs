use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use article_fetcher::{
    EngineEvent, EngineHandle, FetchError, FileDataStore, JobId, ReqwestManager, Title,
};
use fetch_logging::{fetch_debug, fetch_info, fetch_warn};

use crate::config::AppConfig;

const MAX_IDLE_TICKS: u32 = 20;

#[derive(Debug)]
pub struct JobReport {
    pub title: String,
    pub outcome: Result<usize, FetchError>,
}

struct Job {
    title: String,
    percent: Option<u32>,
    outcome: Option<Result<usize, FetchError>>,
}

/// Fetch every title, writing progress lines to `out`. Invalid titles are
/// reported to `out` and skipped; the result has one entry per valid title,
/// in request order.
pub fn fetch_all(
    config: &AppConfig,
    titles: &[String],
    out: &mut dyn Write,
) -> anyhow::Result<Vec<JobReport>> {
    let site = config.site()?;
    let store = Arc::new(FileDataStore::open(config.output_dir.clone())?);
    let manager = Arc::new(ReqwestManager::new(config.fetch_settings()));
    let engine = EngineHandle::new(store, manager)?;

    let mut jobs = BTreeMap::new();
    let mut pending = 0usize;
    for (index, raw) in titles.iter().enumerate() {
        let job_id = index as JobId + 1;
        match Title::new(site.clone(), raw) {
            Ok(title) => {
                jobs.insert(
                    job_id,
                    Job {
                        title: title.to_string(),
                        percent: None,
                        outcome: None,
                    },
                );
                engine.enqueue(job_id, title);
                pending += 1;
            }
            Err(err) => {
                fetch_warn!("Skipping {:?}: {}", raw, err);
                writeln!(out, "{raw}: invalid title: {err}")?;
            }
        }
    }

    let mut idle_ticks = 0;
    while pending > 0 {
        let Some(event) = engine.recv_timeout(Duration::from_millis(100)) else {
            // A fetch whose callback panicked never reports completion.
            if engine.fetcher().in_flight() == 0 {
                idle_ticks += 1;
                if idle_ticks >= MAX_IDLE_TICKS {
                    fetch_warn!("{} job(s) ended without completion", pending);
                    break;
                }
            }
            continue;
        };
        idle_ticks = 0;
        match event {
            EngineEvent::Progress { job_id, fraction } => {
                let Some(job) = jobs.get_mut(&job_id) else {
                    continue;
                };
                let percent = (fraction * 100.0).round() as u32;
                if job.percent != Some(percent) {
                    job.percent = Some(percent);
                    writeln!(out, "{}: {percent:>3}%", job.title)?;
                }
            }
            EngineEvent::Completed { job_id, result } => {
                let Some(job) = jobs.get_mut(&job_id) else {
                    continue;
                };
                match &result {
                    Ok(article) => writeln!(
                        out,
                        "{}: saved {} section(s)",
                        job.title,
                        article.sections.len()
                    )?,
                    Err(err) => writeln!(out, "{}: failed: {err}", job.title)?,
                }
                job.outcome = Some(result.map(|article| article.sections.len()));
                pending -= 1;
            }
        }
    }
    let unread = engine.shutdown();
    if !unread.is_empty() {
        fetch_debug!("Dropped {} engine event(s) after the last completion", unread.len());
    }

    let reports: Vec<JobReport> = jobs
        .into_values()
        .filter_map(|job| {
            job.outcome.map(|outcome| JobReport {
                title: job.title,
                outcome,
            })
        })
        .collect();
    let failed = reports.iter().filter(|r| r.outcome.is_err()).count();
    fetch_info!(
        "Fetched {} of {} article(s) into {:?}",
        reports.len() - failed,
        titles.len(),
        config.output_dir
    );
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use article_fetcher::FailureKind;

    #[test]
    fn reports_invalid_titles_and_network_failures() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let temp = tempfile::TempDir::new().unwrap();
        let config = AppConfig {
            api_url: Some(format!("http://{addr}/w/api.php")),
            output_dir: temp.path().to_path_buf(),
            ..AppConfig::default()
        };
        let titles = vec!["Berlin".to_string(), "a|b".to_string()];
        let mut out = Vec::new();

        let reports = fetch_all(&config, &titles, &mut out).unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].title, "Berlin");
        let err = reports[0].outcome.as_ref().unwrap_err();
        assert_eq!(err.kind, FailureKind::Network);

        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("a|b: invalid title"), "{printed}");
        assert!(printed.contains("Berlin: failed: network error"), "{printed}");
    }
}
