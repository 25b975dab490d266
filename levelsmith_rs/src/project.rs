use crate::bar::BarSeries;
use crate::engine::LevelTable;

/// Per-day projection of the nearest currently-active support and
/// resistance, with their strength metadata.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DailyLevels {
    pub sup_val: f64,
    pub sup_vol: f64,
    pub sup_age: u32,
    pub sup_close: u32,
    pub res_val: f64,
    pub res_vol: f64,
    pub res_age: u32,
    pub res_close: u32,
}

/// One selected level's fields, or the polarity's sentinel when nothing is
/// active that day: supports report value 0 / volume -1, resistances report
/// twice the day's close (guaranteed above price) / volume -1.
fn select(table: &LevelTable, day: usize, close: f64, sentinel_value: f64) -> (f64, f64, u32, u32) {
    let mut best: Option<(f64, usize)> = None;
    for (row, info) in table.infos.iter().enumerate() {
        if !table.alive.get(row, day) {
            continue;
        }
        let distance = if info.value == 0.0 {
            continue;
        } else {
            (info.value - close).abs() / info.value.abs()
        };
        if best.map_or(true, |(current, _)| distance < current) {
            best = Some((distance, row));
        }
    }
    match best {
        Some((_, row)) => {
            let info = &table.infos[row];
            (info.value, info.volume, info.age as u32, info.close_count as u32)
        }
        None => (sentinel_value, -1.0, 0, 0),
    }
}

/// Assemble the eight projector columns for every bar in the series.
/// "Active" means alive at that day in the merged alive matrix; "nearest"
/// minimizes absolute normalized distance to the bar's close.
pub fn project(
    series: &BarSeries,
    supports: &LevelTable,
    resistances: &LevelTable,
) -> Vec<DailyLevels> {
    series
        .bars()
        .iter()
        .enumerate()
        .map(|(day, bar)| {
            let (sup_val, sup_vol, sup_age, sup_close) = select(supports, day, bar.close, 0.0);
            let (res_val, res_vol, res_age, res_close) =
                select(resistances, day, bar.close, 2.0 * bar.close);
            DailyLevels {
                sup_val,
                sup_vol,
                sup_age,
                sup_close,
                res_val,
                res_vol,
                res_age,
                res_close,
            }
        })
        .collect()
}
