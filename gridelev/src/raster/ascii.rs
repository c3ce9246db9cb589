//! ESRI ASCII grid (`.asc`) rasters.
//!
//! A plain-text format carrying its own georeference:
//!
//! ```text
//! ncols        4
//! nrows        2
//! xllcorner    0.0
//! yllcorner    0.0
//! cellsize     0.5
//! NODATA_value -9999
//! 1 2 3 4
//! 5 6 7 8
//! ```
//!
//! The first data row is the northernmost. `xllcenter`/`yllcenter` are
//! accepted in place of the corner keys.

use std::fs;
use std::path::{Path, PathBuf};

use geo::{Coord, Rect};

use crate::error::{ElevationError, Result};
use crate::raster::RasterSampler;

/// An ASCII grid held in memory, row-major from the north edge.
#[derive(Debug, Clone)]
pub struct AsciiGrid {
    ncols: usize,
    nrows: usize,
    /// West edge
    xll: f64,
    /// South edge
    yll: f64,
    cellsize: f64,
    nodata: Option<f64>,
    values: Vec<f64>,
}

impl AsciiGrid {
    /// Read and parse an `.asc` file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        Self::parse(&text).map_err(|message| ElevationError::InvalidRaster {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Parse grid text. Errors are plain messages; [`Self::from_file`]
    /// attaches the path.
    pub fn parse(text: &str) -> std::result::Result<Self, String> {
        let mut ncols = None;
        let mut nrows = None;
        let mut xll = None;
        let mut yll = None;
        let mut centered = (false, false);
        let mut cellsize = None;
        let mut nodata = None;

        let mut tokens = text.split_whitespace().peekable();

        // Header: key/value pairs until the first numeric token
        while let Some(&key) = tokens.peek() {
            if key.parse::<f64>().is_ok() {
                break;
            }
            tokens.next();
            let value = tokens
                .next()
                .ok_or_else(|| format!("missing value for header '{}'", key))?;
            let number: f64 = value
                .parse()
                .map_err(|_| format!("invalid value '{}' for header '{}'", value, key))?;

            match key.to_ascii_lowercase().as_str() {
                "ncols" => ncols = Some(grid_dimension("ncols", number)?),
                "nrows" => nrows = Some(grid_dimension("nrows", number)?),
                "xllcorner" => xll = Some(number),
                "yllcorner" => yll = Some(number),
                "xllcenter" => {
                    xll = Some(number);
                    centered.0 = true;
                }
                "yllcenter" => {
                    yll = Some(number);
                    centered.1 = true;
                }
                "cellsize" => cellsize = Some(number),
                "nodata_value" => nodata = Some(number),
                other => return Err(format!("unknown header '{}'", other)),
            }
        }

        let ncols = ncols.ok_or("missing ncols")?;
        let nrows = nrows.ok_or("missing nrows")?;
        let cellsize = cellsize.ok_or("missing cellsize")?;
        let mut xll = xll.ok_or("missing xllcorner")?;
        let mut yll = yll.ok_or("missing yllcorner")?;

        let cells = ncols
            .checked_mul(nrows)
            .ok_or_else(|| format!("grid of {} x {} cells is too large", ncols, nrows))?;
        if !(cellsize > 0.0 && cellsize.is_finite()) {
            return Err(format!("cellsize must be positive, got {}", cellsize));
        }
        if !(xll.is_finite() && yll.is_finite()) {
            return Err(format!("origin ({}, {}) is not finite", xll, yll));
        }
        if centered.0 {
            xll -= cellsize / 2.0;
        }
        if centered.1 {
            yll -= cellsize / 2.0;
        }

        let values = tokens
            .map(|t| t.parse::<f64>().map_err(|_| format!("invalid cell value '{}'", t)))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        if values.len() != cells {
            return Err(format!(
                "expected {} cell values, found {}",
                cells,
                values.len()
            ));
        }

        Ok(Self {
            ncols,
            nrows,
            xll,
            yll,
            cellsize,
            nodata,
            values,
        })
    }

    /// Value of the cell containing (`lon`, `lat`), `None` outside the grid
    /// or on a no-data cell.
    ///
    /// Points on the east or north edge belong to the last column or row.
    pub fn value_at(&self, lon: f64, lat: f64) -> Option<f64> {
        let col = (lon - self.xll) / self.cellsize;
        let row = (self.yll + self.nrows as f64 * self.cellsize - lat) / self.cellsize;

        if !(0.0..=self.ncols as f64).contains(&col) || !(0.0..=self.nrows as f64).contains(&row)
        {
            return None;
        }
        let col = (col.floor() as usize).min(self.ncols - 1);
        let row = (row.floor() as usize).min(self.nrows - 1);

        let value = self.values[row * self.ncols + col];
        match self.nodata {
            Some(nodata) if value == nodata => None,
            _ => Some(value),
        }
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn cellsize(&self) -> f64 {
        self.cellsize
    }
}

/// Validate an `ncols`/`nrows` header value.
fn grid_dimension(key: &str, value: f64) -> std::result::Result<usize, String> {
    if !value.is_finite() || value < 1.0 || value.fract() != 0.0 || value > u32::MAX as f64 {
        return Err(format!("{} must be a positive whole number, got {}", key, value));
    }
    Ok(value as usize)
}

impl RasterSampler for AsciiGrid {
    fn sample(&self, coords: &[Coord]) -> Vec<Option<f64>> {
        coords.iter().map(|c| self.value_at(c.x, c.y)).collect()
    }

    fn bounds(&self) -> Rect<f64> {
        Rect::new(
            Coord {
                x: self.xll,
                y: self.yll,
            },
            Coord {
                x: self.xll + self.ncols as f64 * self.cellsize,
                y: self.yll + self.nrows as f64 * self.cellsize,
            },
        )
    }
}

/// Write a grid file. Used to build fixtures and by tools that cut tiles.
pub fn write_ascii_grid(
    path: &Path,
    origin: (f64, f64),
    cellsize: f64,
    nodata: f64,
    rows: &[Vec<f64>],
) -> Result<PathBuf> {
    let nrows = rows.len();
    let ncols = rows.first().map(Vec::len).unwrap_or(0);
    let mut text = format!(
        "ncols {}\nnrows {}\nxllcorner {}\nyllcorner {}\ncellsize {}\nNODATA_value {}\n",
        ncols, nrows, origin.0, origin.1, cellsize, nodata
    );
    for row in rows {
        let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        text.push_str(&line.join(" "));
        text.push('\n');
    }
    fs::write(path, text)?;
    Ok(path.to_path_buf())
}
