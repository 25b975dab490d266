use anyhow::{Result, anyhow};

use crate::detect::ExtremumId;

/// Row-major boolean matrix with extremum rows and bar-day columns. Rows
/// carry their `ExtremumId` so consumers join on identity instead of
/// positional coincidence.
#[derive(Clone, Debug, PartialEq)]
pub struct BoolMatrix {
    ids: Vec<ExtremumId>,
    days: usize,
    data: Vec<bool>,
}

impl BoolMatrix {
    pub fn new(ids: Vec<ExtremumId>, days: usize) -> Self {
        let data = vec![false; ids.len() * days];
        Self { ids, days, data }
    }

    pub fn ids(&self) -> &[ExtremumId] {
        &self.ids
    }

    pub fn days(&self) -> usize {
        self.days
    }

    pub fn rows(&self) -> usize {
        self.ids.len()
    }

    pub fn get(&self, row: usize, day: usize) -> bool {
        self.data[row * self.days + day]
    }

    pub fn set(&mut self, row: usize, day: usize, value: bool) {
        self.data[row * self.days + day] = value;
    }

    pub fn row(&self, row: usize) -> &[bool] {
        &self.data[row * self.days..(row + 1) * self.days]
    }

    pub fn row_sum(&self, row: usize) -> usize {
        self.row(row).iter().filter(|&&v| v).count()
    }

    pub fn row_for(&self, id: ExtremumId) -> Option<usize> {
        self.ids.iter().position(|&existing| existing == id)
    }

    /// Stack two matrices of equal width, keeping row order.
    pub fn stack(top: &BoolMatrix, bottom: &BoolMatrix) -> Result<BoolMatrix> {
        if top.days != bottom.days {
            return Err(anyhow!(
                "Cannot stack matrices of widths {} and {}",
                top.days,
                bottom.days
            ));
        }
        let mut ids = top.ids.clone();
        ids.extend_from_slice(&bottom.ids);
        let mut data = top.data.clone();
        data.extend_from_slice(&bottom.data);
        Ok(BoolMatrix {
            ids,
            days: top.days,
            data,
        })
    }

    /// Rebuild the matrix with rows in the order of `ids`. Every requested id
    /// must exist exactly once.
    pub fn reorder(&self, ids: &[ExtremumId]) -> Result<BoolMatrix> {
        let mut out = BoolMatrix::new(ids.to_vec(), self.days);
        for (new_row, &id) in ids.iter().enumerate() {
            let old_row = self
                .row_for(id)
                .ok_or_else(|| anyhow!("Unknown extremum id {id:?} in reorder"))?;
            let src = self.row(old_row);
            for (day, &value) in src.iter().enumerate() {
                out.set(new_row, day, value);
            }
        }
        Ok(out)
    }
}
