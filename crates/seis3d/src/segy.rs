//! SEG-Y geometry mapping and a minimal trace writer.
//!
//! The writer emits a blank textual header, a binary header carrying sample
//! interval / trace length / IEEE-float format, and 240-byte trace headers
//! with inline, crossline, CDP coordinates and the coordinate scalar. It is
//! generic over `io::Write` so tests can target an in-memory buffer.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use byteorder::{BigEndian, WriteBytesExt};

use crate::error::Result;
use crate::seismic_geometry::SeismicGeometry;

/// IEEE-float data sample format code (SEG-Y rev. 1).
const FORMAT_IEEE_FLOAT: u16 = 5;

/// Mapping between (inline, crossline), world (x, y) and grid (i, j).
#[derive(Clone, Debug)]
pub struct SegyGeometry {
    x0: f64,
    y0: f64,
    dx: f64,
    dy: f64,
    angle: f64,
    nx: usize,
    ny: usize,
    il0: i32,
    xl0: i32,
    il_step: i32,
    xl_step: i32,
}

impl SegyGeometry {
    /// Derive the trace numbering from the survey geometry: inlines along
    /// the rotated x axis, crosslines along the rotated y axis.
    pub fn from_grid(geometry: &SeismicGeometry, il0: i32, xl0: i32, il_step: i32, xl_step: i32) -> Self {
        SegyGeometry {
            x0: geometry.x0,
            y0: geometry.y0,
            dx: geometry.dx,
            dy: geometry.dy,
            angle: geometry.angle,
            nx: geometry.nx(),
            ny: geometry.ny(),
            il0,
            xl0,
            il_step: il_step.max(1),
            xl_step: xl_step.max(1),
        }
    }

    pub fn min_il(&self) -> i32 {
        self.il0
    }

    pub fn max_il(&self) -> i32 {
        self.il0 + (self.nx as i32 - 1) * self.il_step
    }

    pub fn il_step(&self) -> i32 {
        self.il_step
    }

    pub fn min_xl(&self) -> i32 {
        self.xl0
    }

    pub fn max_xl(&self) -> i32 {
        self.xl0 + (self.ny as i32 - 1) * self.xl_step
    }

    pub fn xl_step(&self) -> i32 {
        self.xl_step
    }

    /// Grid index of a trace number pair.
    pub fn find_index_from_ilxl(&self, il: i32, xl: i32) -> (usize, usize) {
        let i = ((il - self.il0) / self.il_step).max(0) as usize;
        let j = ((xl - self.xl0) / self.xl_step).max(0) as usize;
        (i.min(self.nx - 1), j.min(self.ny - 1))
    }

    /// World position of a trace number pair (bin centre).
    pub fn find_xy_from_ilxl(&self, il: i32, xl: i32) -> (f64, f64) {
        let (i, j) = self.find_index_from_ilxl(il, xl);
        let (sin_a, cos_a) = self.angle.sin_cos();
        let xl_local = (i as f64 + 0.5) * self.dx;
        let yl_local = (j as f64 + 0.5) * self.dy;
        (
            self.x0 + xl_local * cos_a - yl_local * sin_a,
            self.y0 + xl_local * sin_a + yl_local * cos_a,
        )
    }
}

/// Streaming SEG-Y writer; traces must arrive in ascending (il, xl) order.
pub struct SegyWriter<W: Write> {
    sink: W,
    n_samples: usize,
    dt_us: u16,
    scalco: i16,
    trace_seq: u32,
}

impl SegyWriter<BufWriter<File>> {
    /// Create a file-backed writer and emit the file headers.
    pub fn create<P: AsRef<Path>>(path: P, n_samples: usize, dt_ms: f64, scalco: i16) -> Result<Self> {
        let file = BufWriter::new(File::create(path)?);
        SegyWriter::new(file, n_samples, dt_ms, scalco)
    }
}

impl<W: Write> SegyWriter<W> {
    /// Wrap a sink and emit the textual + binary file headers.
    pub fn new(sink: W, n_samples: usize, dt_ms: f64, scalco: i16) -> Result<Self> {
        let mut writer = SegyWriter {
            sink,
            n_samples,
            dt_us: (dt_ms * 1000.0).round() as u16,
            scalco,
            trace_seq: 0,
        };
        writer.write_file_headers()?;
        Ok(writer)
    }

    fn write_file_headers(&mut self) -> Result<()> {
        // Textual header: 3200 bytes of blanks.
        self.sink.write_all(&[b' '; 3200])?;

        // Binary header: 400 bytes; only the fields readers depend on.
        let mut header = [0u8; 400];
        write_u16(&mut header, 16, self.dt_us);
        write_u16(&mut header, 20, self.n_samples as u16);
        write_u16(&mut header, 24, FORMAT_IEEE_FLOAT);
        self.sink.write_all(&header)?;
        Ok(())
    }

    /// Append one trace.
    pub fn write_trace(&mut self, x: f64, y: f64, il: i32, xl: i32, samples: &[f64]) -> Result<()> {
        debug_assert_eq!(samples.len(), self.n_samples);
        self.trace_seq += 1;

        let mut header = [0u8; 240];
        write_i32(&mut header, 0, self.trace_seq as i32);
        write_i16(&mut header, 70, self.scalco);
        let (sx, sy) = self.scale_coords(x, y);
        write_i32(&mut header, 72, sx);
        write_i32(&mut header, 76, sy);
        write_u16(&mut header, 114, self.n_samples as u16);
        write_u16(&mut header, 116, self.dt_us);
        write_i32(&mut header, 180, sx);
        write_i32(&mut header, 184, sy);
        write_i32(&mut header, 188, il);
        write_i32(&mut header, 192, xl);
        self.sink.write_all(&header)?;

        for &s in samples {
            self.sink.write_f32::<BigEndian>(s as f32)?;
        }
        Ok(())
    }

    /// Flush and hand back the sink.
    pub fn finish(mut self) -> Result<W> {
        self.sink.flush()?;
        Ok(self.sink)
    }

    fn scale_coords(&self, x: f64, y: f64) -> (i32, i32) {
        // Stored value recovers the real coordinate through the scalar:
        // positive scalco multiplies, negative divides.
        let factor = if self.scalco >= 1 {
            1.0 / self.scalco as f64
        } else {
            -(self.scalco as f64)
        };
        ((x * factor).round() as i32, (y * factor).round() as i32)
    }
}

fn write_u16(buf: &mut [u8], offset: usize, v: u16) {
    buf[offset..offset + 2].copy_from_slice(&v.to_be_bytes());
}

fn write_i16(buf: &mut [u8], offset: usize, v: i16) {
    buf[offset..offset + 2].copy_from_slice(&v.to_be_bytes());
}

fn write_i32(buf: &mut [u8], offset: usize, v: i32) {
    buf[offset..offset + 4].copy_from_slice(&v.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> SeismicGeometry {
        let mut g = SeismicGeometry {
            dx: 25.0,
            dy: 25.0,
            dz: 4.0,
            dt: 4.0,
            ..Default::default()
        };
        g.set_geometry(1000.0, 2000.0, 100.0, 50.0, 0.0);
        g
    }

    #[test]
    fn ilxl_roundtrip() {
        let sg = SegyGeometry::from_grid(&geometry(), 100, 200, 2, 1);
        assert_eq!(sg.min_il(), 100);
        assert_eq!(sg.max_il(), 106);
        assert_eq!(sg.find_index_from_ilxl(104, 201), (2, 1));
        let (x, y) = sg.find_xy_from_ilxl(100, 200);
        assert!((x - 1012.5).abs() < 1e-9);
        assert!((y - 2012.5).abs() < 1e-9);
    }

    #[test]
    fn file_header_layout() {
        let buf = Vec::new();
        let w = SegyWriter::new(buf, 10, 4.0, 1).unwrap();
        let buf = w.finish().unwrap();
        assert_eq!(buf.len(), 3600);
        // Sample interval 4000 us at binary-header offset 16.
        assert_eq!(&buf[3216..3218], &4000u16.to_be_bytes());
        // Trace length at offset 20, format code 5 at offset 24.
        assert_eq!(&buf[3220..3222], &10u16.to_be_bytes());
        assert_eq!(&buf[3224..3226], &5u16.to_be_bytes());
    }

    #[test]
    fn trace_layout_carries_ilxl_and_samples() {
        let w = SegyWriter::new(Vec::new(), 2, 4.0, 1).unwrap();
        let mut w = w;
        w.write_trace(100.0, 250.0, 7, 9, &[1.5, -2.0]).unwrap();
        let buf = w.finish().unwrap();
        let trace = &buf[3600..];
        assert_eq!(trace.len(), 240 + 8);
        assert_eq!(&trace[188..192], &7i32.to_be_bytes());
        assert_eq!(&trace[192..196], &9i32.to_be_bytes());
        assert_eq!(&trace[180..184], &100i32.to_be_bytes());
        assert_eq!(&trace[240..244], &1.5f32.to_be_bytes());
        assert_eq!(&trace[244..248], &(-2.0f32).to_be_bytes());
    }
}
