//! Read / write two-column (axis value, intensity) text patterns

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use ndarray::{Array1, ArrayView1};

use crate::error::{Error, Result};

/// Lines starting with `#` and blank lines are ignored. Any further columns
/// are ignored too.
pub fn read(path: &Path) -> Result<(Array1<f32>, Array1<f32>)> {
    let file = BufReader::new(File::open(path)?);
    let (mut xs, mut ys) = (vec![], vec![]);
    for (n, line) in file.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') { continue }
        let bad = |reason: String| Error::Pattern { path: path.to_path_buf(), line: n + 1, reason };
        let mut columns = line.split_whitespace();
        let mut next = |name: &str| -> Result<f32> {
            columns.next()
                .ok_or_else(|| bad(format!("missing {name} column")))?
                .parse::<f32>()
                .map_err(|e| bad(format!("{name}: {e}")))
        };
        xs.push(next("x")?);
        ys.push(next("intensity")?);
    }
    if xs.is_empty() {
        return Err(Error::Pattern { path: path.to_path_buf(), line: 0, reason: "no data".into() })
    }
    Ok((Array1::from(xs), Array1::from(ys)))
}

pub fn write(path: &Path, axis_label: &str, x: ArrayView1<f32>, y: ArrayView1<f32>) -> Result<()> {
    if x.len() != y.len() {
        return Err(Error::ShapeMismatch { what: "pattern intensity".into(), expected: vec![x.len()], actual: vec![y.len()] })
    }
    let mut buf = BufWriter::new(File::create(path)?);
    writeln!(buf, "#  {axis_label}  intensity")?;
    for (x, y) in x.iter().zip(y.iter()) {
        writeln!(buf, "{x:.6}  {y:.6}")?;
    }
    buf.flush()?;
    Ok(())
}
