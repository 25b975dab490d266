use std::fs::{self, File};
use std::path::{Path, PathBuf};

use ahash::AHashMap;
use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::bar::{BarSeries, Polarity};
use crate::config::EngineConfig;
use crate::detect::ExtremumId;
use crate::engine::{LevelInfo, LevelTable};
use crate::matrix::BoolMatrix;

/// The fixed artifact set memoized per symbol. The cache contract is
/// all-or-nothing: a symbol is a hit only when the manifest and every
/// artifact are present, readable, and bound to the same dataset
/// fingerprint and engine configuration.
const ARTIFACTS: [&str; 6] = [
    "support_info",
    "support_alive",
    "support_close",
    "resistance_info",
    "resistance_alive",
    "resistance_close",
];

const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Manifest {
    version: u32,
    symbol: String,
    /// sha256 over the symbol's bars; prefixed so future fingerprint schemes
    /// can coexist with old cache directories.
    fingerprint: String,
    engine: EngineConfig,
    days: usize,
}

/// Per-symbol blob store for computed level artifacts. Purely a memoization
/// layer: the engine never relies on it for correctness, and any doubt about
/// an entry forces full recomputation.
pub struct LevelStore {
    root: PathBuf,
}

impl LevelStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("Unable to create cache directory {}", root.display()))?;
        Ok(Self { root })
    }

    fn symbol_dir(&self, symbol: &str) -> PathBuf {
        self.root.join(symbol)
    }

    fn manifest_path(&self, symbol: &str) -> PathBuf {
        self.symbol_dir(symbol).join("manifest.json")
    }

    fn artifact_path(&self, symbol: &str, name: &str) -> PathBuf {
        self.symbol_dir(symbol).join(format!("{name}.parquet"))
    }

    /// Load the cached level tables for a series, or `None` when there is no
    /// complete matching entry. Read or decode failures are errors so the
    /// caller can log them before recomputing.
    pub fn load(
        &self,
        series: &BarSeries,
        config: &EngineConfig,
    ) -> Result<Option<(LevelTable, LevelTable)>> {
        let symbol = series.symbol();
        let manifest_path = self.manifest_path(symbol);
        if !manifest_path.exists() {
            return Ok(None);
        }
        for name in ARTIFACTS {
            if !self.artifact_path(symbol, name).exists() {
                debug!(symbol, artifact = name, "Incomplete artifact set; ignoring cache");
                return Ok(None);
            }
        }

        let raw = fs::read_to_string(&manifest_path)
            .with_context(|| format!("Unable to read {}", manifest_path.display()))?;
        let manifest: Manifest = serde_json::from_str(&raw)
            .with_context(|| format!("Corrupt manifest at {}", manifest_path.display()))?;

        if manifest.version != MANIFEST_VERSION
            || manifest.symbol != symbol
            || manifest.engine != *config
            || manifest.days != series.len()
            || manifest.fingerprint != bars_fingerprint(series)
        {
            debug!(symbol, "Stale cache entry; ignoring");
            return Ok(None);
        }

        let supports = self.load_table(symbol, Polarity::Support, manifest.days)?;
        let resistances = self.load_table(symbol, Polarity::Resistance, manifest.days)?;
        Ok(Some((supports, resistances)))
    }

    /// Persist the six artifacts as a set. Frames land in `*.tmp` files and
    /// are renamed into place before the manifest is written last, so a torn
    /// write leaves a directory that never validates.
    pub fn save(
        &self,
        series: &BarSeries,
        config: &EngineConfig,
        supports: &LevelTable,
        resistances: &LevelTable,
    ) -> Result<()> {
        let symbol = series.symbol();
        let dir = self.symbol_dir(symbol);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Unable to create {}", dir.display()))?;

        // Invalidate any previous entry before touching its artifacts.
        let manifest_path = self.manifest_path(symbol);
        if manifest_path.exists() {
            fs::remove_file(&manifest_path)
                .with_context(|| format!("Unable to invalidate {}", manifest_path.display()))?;
        }

        for (polarity, table) in [
            (Polarity::Support, supports),
            (Polarity::Resistance, resistances),
        ] {
            let prefix = polarity.label();
            self.write_artifact(symbol, &format!("{prefix}_info"), info_frame(table)?)?;
            self.write_artifact(
                symbol,
                &format!("{prefix}_alive"),
                matrix_frame(&table.alive)?,
            )?;
            self.write_artifact(
                symbol,
                &format!("{prefix}_close"),
                matrix_frame(&table.close)?,
            )?;
        }

        let manifest = Manifest {
            version: MANIFEST_VERSION,
            symbol: symbol.to_string(),
            fingerprint: bars_fingerprint(series),
            engine: *config,
            days: series.len(),
        };
        let tmp = manifest_path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&manifest)?)
            .with_context(|| format!("Unable to write {}", tmp.display()))?;
        fs::rename(&tmp, &manifest_path)
            .with_context(|| format!("Unable to finalize {}", manifest_path.display()))?;
        Ok(())
    }

    fn write_artifact(&self, symbol: &str, name: &str, mut frame: DataFrame) -> Result<()> {
        let final_path = self.artifact_path(symbol, name);
        let tmp_path = final_path.with_extension("parquet.tmp");
        let mut file = File::create(&tmp_path)
            .with_context(|| format!("Unable to create {}", tmp_path.display()))?;
        ParquetWriter::new(&mut file)
            .with_compression(ParquetCompression::Zstd(None))
            .finish(&mut frame)
            .with_context(|| format!("Failed to write Parquet artifact '{name}'"))?;
        fs::rename(&tmp_path, &final_path)
            .with_context(|| format!("Unable to finalize {}", final_path.display()))?;
        Ok(())
    }

    fn load_table(&self, symbol: &str, polarity: Polarity, days: usize) -> Result<LevelTable> {
        let prefix = polarity.label();
        let infos = read_info(&self.artifact_path(symbol, &format!("{prefix}_info")))?;
        let ids: Vec<ExtremumId> = infos.iter().map(|info| info.id).collect();
        let alive = read_matrix(
            &self.artifact_path(symbol, &format!("{prefix}_alive")),
            &ids,
            days,
        )?;
        let close = read_matrix(
            &self.artifact_path(symbol, &format!("{prefix}_close")),
            &ids,
            days,
        )?;
        Ok(LevelTable {
            polarity,
            infos,
            alive,
            close,
        })
    }
}

/// Content fingerprint of one symbol's bars, used to bind cache entries to
/// the exact dataset they were computed from.
pub fn bars_fingerprint(series: &BarSeries) -> String {
    let mut hasher = Sha256::new();
    hasher.update(series.symbol().as_bytes());
    for bar in series.bars() {
        hasher.update(bar.date.format("%Y-%m-%d").to_string().as_bytes());
        for value in [bar.open, bar.high, bar.low, bar.close, bar.volume] {
            hasher.update(value.to_le_bytes());
        }
    }
    format!("bars:{}", hex::encode(hasher.finalize()))
}

fn info_frame(table: &LevelTable) -> Result<DataFrame> {
    let infos = &table.infos;
    let columns = vec![
        Series::new("id", infos.iter().map(|i| i.id.0).collect::<Vec<u32>>()),
        Series::new("day", infos.iter().map(|i| i.day as u32).collect::<Vec<u32>>()),
        Series::new(
            "date",
            infos
                .iter()
                .map(|i| i.date.format("%Y-%m-%d").to_string())
                .collect::<Vec<String>>(),
        ),
        Series::new("value", infos.iter().map(|i| i.value).collect::<Vec<f64>>()),
        Series::new("volume", infos.iter().map(|i| i.volume).collect::<Vec<f64>>()),
        Series::new("age", infos.iter().map(|i| i.age as u32).collect::<Vec<u32>>()),
        Series::new(
            "end_date",
            infos
                .iter()
                .map(|i| i.end_date.map(|d| d.format("%Y-%m-%d").to_string()))
                .collect::<Vec<Option<String>>>(),
        ),
        Series::new("ended", infos.iter().map(|i| i.ended).collect::<Vec<bool>>()),
        Series::new(
            "original",
            infos.iter().map(|i| i.original).collect::<Vec<bool>>(),
        ),
        Series::new(
            "close_count",
            infos.iter().map(|i| i.close_count as u32).collect::<Vec<u32>>(),
        ),
    ];
    DataFrame::new(columns).context("Failed to build info artifact frame")
}

/// Matrices are stored sparse: one (id, day) row per true cell. Shape comes
/// from the info table's ids and the manifest's day count.
fn matrix_frame(matrix: &BoolMatrix) -> Result<DataFrame> {
    let mut ids: Vec<u32> = Vec::new();
    let mut days: Vec<u32> = Vec::new();
    for (row, id) in matrix.ids().iter().enumerate() {
        for (day, &set) in matrix.row(row).iter().enumerate() {
            if set {
                ids.push(id.0);
                days.push(day as u32);
            }
        }
    }
    DataFrame::new(vec![Series::new("id", ids), Series::new("day", days)])
        .context("Failed to build matrix artifact frame")
}

fn read_frame(path: &Path) -> Result<DataFrame> {
    let file =
        File::open(path).with_context(|| format!("Unable to open {}", path.display()))?;
    ParquetReader::new(file)
        .finish()
        .with_context(|| format!("Corrupt Parquet artifact at {}", path.display()))
}

fn parse_date(raw: &str, path: &Path) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{raw}' in {}", path.display()))
}

fn read_info(path: &Path) -> Result<Vec<LevelInfo>> {
    let frame = read_frame(path)?;
    let id = frame.column("id")?.u32()?.clone();
    let day = frame.column("day")?.u32()?.clone();
    let date = frame.column("date")?.str()?.clone();
    let value = frame.column("value")?.f64()?.clone();
    let volume = frame.column("volume")?.f64()?.clone();
    let age = frame.column("age")?.u32()?.clone();
    let end_date = frame.column("end_date")?.str()?.clone();
    let ended = frame.column("ended")?.bool()?.clone();
    let original = frame.column("original")?.bool()?.clone();
    let close_count = frame.column("close_count")?.u32()?.clone();

    let mut infos = Vec::with_capacity(frame.height());
    for row in 0..frame.height() {
        let row_id = id
            .get(row)
            .ok_or_else(|| anyhow!("Null 'id' at row {row} in {}", path.display()))?;
        let end = match end_date.get(row) {
            Some(raw) => Some(parse_date(raw, path)?),
            None => None,
        };
        let raw_date = date
            .get(row)
            .ok_or_else(|| anyhow!("Null 'date' at row {row} in {}", path.display()))?;
        infos.push(LevelInfo {
            id: ExtremumId(row_id),
            day: day.get(row).unwrap_or_default() as usize,
            date: parse_date(raw_date, path)?,
            value: value.get(row).unwrap_or_default(),
            volume: volume.get(row).unwrap_or_default(),
            age: age.get(row).unwrap_or_default() as usize,
            end_date: end,
            ended: ended.get(row).unwrap_or_default(),
            original: original.get(row).unwrap_or_default(),
            close_count: close_count.get(row).unwrap_or_default() as usize,
        });
    }
    Ok(infos)
}

fn read_matrix(path: &Path, ids: &[ExtremumId], days: usize) -> Result<BoolMatrix> {
    let frame = read_frame(path)?;
    let id_col = frame.column("id")?.u32()?.clone();
    let day_col = frame.column("day")?.u32()?.clone();

    let rows_by_id: AHashMap<u32, usize> = ids
        .iter()
        .enumerate()
        .map(|(row, id)| (id.0, row))
        .collect();

    let mut matrix = BoolMatrix::new(ids.to_vec(), days);
    for cell in 0..frame.height() {
        let (Some(id), Some(day)) = (id_col.get(cell), day_col.get(cell)) else {
            return Err(anyhow!("Null matrix cell at row {cell} in {}", path.display()));
        };
        let row = *rows_by_id
            .get(&id)
            .ok_or_else(|| anyhow!("Matrix id {id} not present in info table ({})", path.display()))?;
        if day as usize >= days {
            return Err(anyhow!("Matrix day {day} out of range in {}", path.display()));
        }
        matrix.set(row, day as usize, true);
    }
    Ok(matrix)
}
