//! Rotated-cube dump.
//!
//! STORM compatibility proper is out of scope; this writes the in-memory
//! cube with a one-line ASCII geometry header followed by little-endian f32
//! samples in (i fastest, then j, then k) order, which is enough for the
//! round-trip tooling around the engine.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::constants::MISSING;
use crate::error::Result;
use crate::grid::Grid3;

/// Magic tag leading every cube file.
const MAGIC: &str = "seis3d_cube_binary";

/// Write a cube to `path`.
pub fn write_cube<P: AsRef<Path>>(path: P, grid: &Grid3) -> Result<()> {
    let mut sink = BufWriter::new(File::create(path)?);
    write_cube_to(&mut sink, grid)?;
    sink.flush()?;
    Ok(())
}

/// Write a cube to an arbitrary sink.
pub fn write_cube_to<W: Write>(sink: &mut W, grid: &Grid3) -> Result<()> {
    writeln!(
        sink,
        "{MAGIC} {} {} {} {} {} {} {} {} {} {} {}",
        grid.x0,
        grid.y0,
        grid.dx * grid.nx as f64,
        grid.dy * grid.ny as f64,
        grid.angle,
        grid.z_min,
        grid.z_max,
        grid.nx,
        grid.ny,
        grid.nk,
        MISSING,
    )?;
    for &v in grid.data() {
        sink.write_f32::<LittleEndian>(v as f32)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_then_samples() {
        let mut grid = Grid3::new(0.0, 0.0, 10.0, 10.0, 0.0, 0.0, 100.0, 2, 1, 1, 0.0);
        grid.set(0, 0, 0, 1.0);
        grid.set(1, 0, 0, -2.5);
        let mut buf = Vec::new();
        write_cube_to(&mut buf, &grid).unwrap();
        let newline = buf.iter().position(|&b| b == b'\n').unwrap();
        let header = std::str::from_utf8(&buf[..newline]).unwrap();
        assert!(header.starts_with(MAGIC));
        let body = &buf[newline + 1..];
        assert_eq!(body.len(), 8);
        assert_eq!(&body[0..4], &1.0f32.to_le_bytes());
        assert_eq!(&body[4..8], &(-2.5f32).to_le_bytes());
    }
}
