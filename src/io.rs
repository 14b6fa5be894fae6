//! 文本输出以及哈密顿量的 json 存取.
use crate::error::Result;
use crate::Hamiltonian;
use ndarray::{ArrayBase, Axis, Data, Ix1, Ix2};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};

/// Writes a table of numbers, one row per line, without a header.
pub fn write_txt<S>(data: &ArrayBase<S, Ix2>, output: &str) -> Result<()>
where
    S: Data<Elem = f64>,
{
    let mut file = BufWriter::new(File::create(output)?);
    let mut s0 = String::new();
    for row in data.axis_iter(Axis(0)) {
        for x in row.iter() {
            if *x >= 0.0 {
                s0.push_str("     ");
            } else {
                s0.push_str("    ");
            }
            s0.push_str(&format!("{:.6}", x));
        }
        s0.push('\n');
    }
    file.write_all(s0.as_bytes())?;
    Ok(())
}

pub fn write_txt_1<S>(data: &ArrayBase<S, Ix1>, output: &str) -> Result<()>
where
    S: Data<Elem = f64>,
{
    let mut file = BufWriter::new(File::create(output)?);
    let mut s0 = String::new();
    for x in data.iter() {
        if *x >= 0.0 {
            s0.push(' ');
        }
        s0.push_str(&format!("{:.6}\n", x));
    }
    file.write_all(s0.as_bytes())?;
    Ok(())
}

impl Hamiltonian {
    /// Stores the whole Hamiltonian (blocks, mode, geometry) as json.
    pub fn save(&self, path: &str) -> Result<()> {
        let file = BufWriter::new(File::create(path)?);
        serde_json::to_writer(file, self)?;
        Ok(())
    }

    pub fn load(path: &str) -> Result<Hamiltonian> {
        let file = BufReader::new(File::open(path)?);
        let h: Hamiltonian = serde_json::from_reader(file)?;
        h.check()?;
        Ok(h)
    }
}
