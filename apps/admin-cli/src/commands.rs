//! Mapping operations behind the subcommands.
//!
//! Every mutation goes to the store first and then rewrites the local CSV
//! file. Reads fall back to that file when the store cannot be listed.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use domain::code::RandomCodeGenerator;
use domain::service::{filter_mappings, MappingService};
use domain::{KvStore, Mapping, NewMapping, ShortCode, UtmParams};
use mapping_csv::CsvCache;
use tracing::warn;

use crate::cli::UtmArgs;

/// Where a listing came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Source {
    Store,
    CsvFallback,
}

pub struct Manager<S: KvStore> {
    service: MappingService<S, RandomCodeGenerator>,
    csv: CsvCache,
    worker_url: String,
}

impl<S: KvStore> Manager<S> {
    pub fn new(store: S, csv_file: impl Into<PathBuf>, worker_url: &str) -> Self {
        Self {
            service: MappingService::new(store, RandomCodeGenerator::default()),
            csv: CsvCache::new(csv_file),
            worker_url: worker_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn csv_path(&self) -> &Path {
        self.csv.path()
    }

    pub fn short_url(&self, code: &str) -> String {
        format!("{}/{}", self.worker_url, code)
    }

    pub async fn list(&self) -> Result<(Vec<Mapping>, Source)> {
        match self.service.list_all().await {
            Ok(all) => Ok((all, Source::Store)),
            Err(e) => {
                warn!(error = %e, path = %self.csv.path().display(), "store listing failed; falling back to csv");
                let rows = self
                    .csv
                    .read()
                    .with_context(|| format!("reading {}", self.csv.path().display()))?;
                match rows {
                    Some(rows) => Ok((rows, Source::CsvFallback)),
                    None => bail!(
                        "could not list mappings ({}) and no CSV file at {}",
                        e,
                        self.csv.path().display()
                    ),
                }
            }
        }
    }

    pub async fn search(&self, term: &str) -> Result<(Vec<Mapping>, Source)> {
        if term.trim().is_empty() {
            bail!("search term cannot be empty");
        }
        let (all, source) = self.list().await?;
        Ok((filter_mappings(all, term), source))
    }

    pub async fn create(&self, long_url: &str, code: Option<&str>, utm: UtmArgs) -> Result<Mapping> {
        let custom_code = code
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(ShortCode::new)
            .transpose()?;
        let created = self
            .service
            .create(new_mapping(long_url, custom_code, utm))
            .await
            .context("creating short URL")?;
        self.sync_csv().await;
        Ok(created)
    }

    pub async fn update(&self, code: &str, long_url: &str, utm: UtmArgs) -> Result<Mapping> {
        let updated = self
            .service
            .update(code, new_mapping(long_url, None, utm))
            .await
            .with_context(|| format!("updating '{}'", code))?;
        self.sync_csv().await;
        Ok(updated)
    }

    pub async fn delete(&self, code: &str, confirmed: bool) -> Result<()> {
        if !confirmed {
            bail!("refusing to delete '{}' without --yes", code);
        }
        self.service
            .delete(code)
            .await
            .with_context(|| format!("deleting '{}'", code))?;
        self.sync_csv().await;
        Ok(())
    }

    /// Write every mapping in the store to `file`, or to the configured
    /// CSV file. Returns the number of rows written and the path.
    pub async fn export(&self, file: Option<PathBuf>) -> Result<(usize, PathBuf)> {
        let all = self.service.list_all().await.context("listing mappings")?;
        let target = match file {
            Some(path) => CsvCache::new(path),
            None => self.csv.clone(),
        };
        target
            .write(&all)
            .with_context(|| format!("writing {}", target.path().display()))?;
        Ok((all.len(), target.path().to_path_buf()))
    }

    /// The mutation already happened; a stale CSV is only worth a warning.
    async fn sync_csv(&self) {
        if let Err(e) = self.export(None).await {
            let detail = format!("{:#}", e);
            warn!(error = %detail, "csv file not updated");
        }
    }
}

fn new_mapping(long_url: &str, custom_code: Option<ShortCode>, utm: UtmArgs) -> NewMapping {
    NewMapping {
        long_url: long_url.trim().to_string(),
        custom_code,
        utm: UtmParams::new(utm.utm_source, utm.utm_medium, utm.utm_campaign),
        tags: utm.tags,
    }
}
