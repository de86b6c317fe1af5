//! Output gates.
//!
//! One `SeisOutput` per run owns every requested sink: streaming SEG-Y
//! writers (which require strict trace order, guaranteed by the scheduler)
//! and in-memory cubes flushed once after all producers are done. Traces
//! arrive through `add_trace`; everything grid-shaped leaves in `finalize`.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::Result;
use crate::grid::Grid3;
use crate::interpolation::interpolate_linear;
use crate::regrid::{self, VrmsLeg};
use crate::segy::SegyWriter;
use crate::session::{Session, TimeAxes};
use crate::storm;
use crate::surface::RegularSurface;
use crate::trace::TraceResult;

type FileSegy = SegyWriter<BufWriter<File>>;

/// Sample window of one output axis.
#[derive(Clone, Copy, Debug)]
struct AxisWindow {
    lo: usize,
    hi: usize,
}

impl AxisWindow {
    fn full(len: usize) -> Self {
        AxisWindow { lo: 0, hi: len }
    }

    fn clipped(axis: &[f64], window: Option<[f64; 2]>, len: usize) -> Self {
        match window {
            Some([top, bot]) => {
                let lo = axis.partition_point(|&v| v < top);
                let hi = axis.partition_point(|&v| v <= bot).min(len);
                AxisWindow { lo, hi: hi.max(lo) }
            }
            None => AxisWindow::full(len),
        }
    }

    fn len(&self) -> usize {
        self.hi - self.lo
    }
}

/// All sinks of a run.
pub struct SeisOutput {
    dir: PathBuf,
    prefix: String,
    suffix: String,

    time_segy: Option<FileSegy>,
    time_stack_segy: Option<FileSegy>,
    prenmo_segy: Option<FileSegy>,
    depth_segy: Option<FileSegy>,
    depth_stack_segy: Option<FileSegy>,
    timeshift_segy: Option<FileSegy>,
    timeshift_stack_segy: Option<FileSegy>,

    time_window: AxisWindow,
    depth_window: AxisWindow,
    shift_window: AxisWindow,

    storm_time: Option<Grid3>,
    storm_depth: Option<Grid3>,
    storm_timeshift: Option<Grid3>,
    r_cubes: Vec<Grid3>,
}

impl SeisOutput {
    /// Open every requested sink. Reflection cubes move out of the session
    /// here so the writer thread never needs mutable access to it.
    pub fn new(session: &mut Session, axes: &TimeAxes, dir: &Path) -> Result<Self> {
        let settings = &session.settings;
        let flags = &settings.output;
        let g = &session.geometry;
        let dt = g.dt;
        let scalco = settings.scalco;

        let nmo_len = axes.time_samples_stretch;
        let time_axis = if settings.nmo {
            &axes.twt_0[..nmo_len]
        } else {
            &axes.twt_0[..]
        };
        let time_window = AxisWindow::clipped(time_axis, settings.time_window, time_axis.len());
        let depth_window = AxisWindow::clipped(&axes.z_0, settings.depth_window, axes.z_0.len());
        let shift_window = AxisWindow::full(axes.twts_0.len());

        std::fs::create_dir_all(dir)?;
        let name = |stem: &str, ext: &str| {
            dir.join(format!("{}{}{}.{}", settings.prefix, stem, settings.suffix, ext))
        };
        let open = |stem: &str, n: usize, sample_step: f64| -> Result<Option<FileSegy>> {
            Ok(Some(SegyWriter::create(name(stem, "segy"), n, sample_step, scalco)?))
        };

        let mut output = SeisOutput {
            dir: dir.to_path_buf(),
            prefix: settings.prefix.clone(),
            suffix: settings.suffix.clone(),
            time_segy: None,
            time_stack_segy: None,
            prenmo_segy: None,
            depth_segy: None,
            depth_stack_segy: None,
            timeshift_segy: None,
            timeshift_stack_segy: None,
            time_window,
            depth_window,
            shift_window,
            storm_time: None,
            storm_depth: None,
            storm_timeshift: None,
            r_cubes: std::mem::take(&mut session.r_grids),
        };

        if flags.time_segy {
            output.time_segy = open("seismic_time", time_window.len(), dt)?;
        }
        if flags.time_stack_segy {
            output.time_stack_segy = open("seismic_time_stack", time_window.len(), dt)?;
        }
        if flags.prenmo_segy && settings.nmo {
            output.prenmo_segy = open("seismic_time_prenmo", axes.twt_0.len(), dt)?;
        }
        if flags.depth_segy {
            output.depth_segy = open("seismic_depth", depth_window.len(), g.dz)?;
        }
        if flags.depth_stack_segy {
            output.depth_stack_segy = open("seismic_depth_stack", depth_window.len(), g.dz)?;
        }
        if flags.timeshift_segy {
            output.timeshift_segy = open("seismic_timeshift", shift_window.len(), dt)?;
        }
        if flags.timeshift_stack_segy {
            output.timeshift_stack_segy = open("seismic_timeshift_stack", shift_window.len(), dt)?;
        }

        let cube = |nk: usize, z_min: f64, z_max: f64| {
            Grid3::new(
                g.x0,
                g.y0,
                g.dx,
                g.dy,
                g.angle,
                z_min,
                z_max,
                g.nx(),
                g.ny(),
                nk,
                0.0,
            )
        };
        if flags.time_storm {
            output.storm_time = Some(cube(time_window.len(), g.t_min, g.t_max));
        }
        if flags.depth_storm {
            output.storm_depth = Some(cube(depth_window.len(), g.z_min, g.z_max));
        }
        if flags.timeshift_storm && !axes.twts_0.is_empty() {
            output.storm_timeshift = Some(cube(
                shift_window.len(),
                axes.twts_0[0],
                axes.twts_0[axes.twts_0.len() - 1],
            ));
        }
        Ok(output)
    }

    /// Consume one trace; must be called in ascending (il, xl) order.
    pub fn add_trace(&mut self, result: &TraceResult) -> Result<()> {
        let tw = self.time_window;
        let dw = self.depth_window;
        let sw = self.shift_window;

        if let Some(writer) = self.prenmo_segy.as_mut() {
            write_gather(writer, result, &result.prestack, AxisWindow::full(result.prestack.ni()))?;
        }
        let time_source = if result.nmo_prestack.ni() > 0 {
            &result.nmo_prestack
        } else {
            &result.prestack
        };
        if let Some(writer) = self.time_segy.as_mut() {
            write_gather(writer, result, time_source, tw)?;
        }
        if let Some(writer) = self.time_stack_segy.as_mut() {
            write_gather(writer, result, &result.stack, tw)?;
        }
        if let Some(writer) = self.depth_segy.as_mut() {
            write_gather(writer, result, &result.depth, dw)?;
        }
        if let Some(writer) = self.depth_stack_segy.as_mut() {
            write_gather(writer, result, &result.depth_stack, dw)?;
        }
        if let Some(writer) = self.timeshift_segy.as_mut() {
            write_gather(writer, result, &result.timeshift, sw)?;
        }
        if let Some(writer) = self.timeshift_stack_segy.as_mut() {
            write_gather(writer, result, &result.timeshift_stack, sw)?;
        }

        if let Some(cube) = self.storm_time.as_mut() {
            splat_stack(cube, result, &result.stack, tw);
        }
        if let Some(cube) = self.storm_depth.as_mut() {
            splat_stack(cube, result, &result.depth_stack, dw);
        }
        if let Some(cube) = self.storm_timeshift.as_mut() {
            splat_stack(cube, result, &result.timeshift_stack, sw);
        }
        for (cube, values) in self
            .r_cubes
            .iter_mut()
            .zip([&result.r0, &result.r0_noisy])
        {
            for (k, &v) in values.iter().enumerate() {
                cube.set(result.i, result.j, k, v);
            }
        }
        Ok(())
    }

    /// Flush the SEG-Y files and write every grid-shaped output.
    pub fn finalize(mut self, session: &mut Session) -> Result<()> {
        for writer in [
            self.time_segy.take(),
            self.time_stack_segy.take(),
            self.prenmo_segy.take(),
            self.depth_segy.take(),
            self.depth_stack_segy.take(),
            self.timeshift_segy.take(),
            self.timeshift_stack_segy.take(),
        ]
        .into_iter()
        .flatten()
        {
            writer.finish()?;
        }

        let name = |stem: &str, ext: &str| {
            self.dir
                .join(format!("{}{}{}.{}", self.prefix, stem, self.suffix, ext))
        };

        if let Some(cube) = self.storm_time.take() {
            storm::write_cube(name("seismic_time", "storm"), &cube)?;
        }
        if let Some(cube) = self.storm_depth.take() {
            storm::write_cube(name("seismic_depth", "storm"), &cube)?;
        }
        if let Some(cube) = self.storm_timeshift.take() {
            storm::write_cube(name("seismic_timeshift", "storm"), &cube)?;
        }
        let r_cubes = std::mem::take(&mut self.r_cubes);
        for (idx, cube) in r_cubes.iter().enumerate() {
            let stem = if idx == 0 { "reflections" } else { "reflections_noise" };
            storm::write_cube(name(stem, "storm"), cube)?;
        }
        session.r_grids = r_cubes;

        let flags = session.settings.output.clone();
        if flags.elastic_storm {
            storm::write_cube(name("vp", "storm"), &session.vp_grid)?;
            storm::write_cube(name("vs", "storm"), &session.vs_grid)?;
            storm::write_cube(name("rho", "storm"), &session.rho_grid)?;
        }
        if flags.zvalues_storm {
            storm::write_cube(name("zgrid", "storm"), &session.z_grid)?;
        }
        if flags.twt_storm {
            storm::write_cube(name("twt", "storm"), &session.twt_grid)?;
        }
        if flags.vrms {
            if session.settings.ps_seismic {
                regrid::fill_vrms_grid(session, VrmsLeg::Pp);
                if let Some(cube) = session.vrms_grid.as_ref() {
                    storm::write_cube(name("vrms_pp", "storm"), cube)?;
                }
                regrid::fill_vrms_grid(session, VrmsLeg::Ss);
                if let Some(cube) = session.vrms_grid.as_ref() {
                    storm::write_cube(name("vrms_ss", "storm"), cube)?;
                }
            } else if let Some(cube) = session.vrms_grid.as_ref() {
                storm::write_cube(name("vrms", "storm"), cube)?;
            }
        }
        if flags.depth_surfaces {
            write_surface(name("topeclipse", "surf"), &session.top_eclipse)?;
            write_surface(name("boteclipse", "surf"), &session.bottom_eclipse)?;
        }
        if flags.time_surfaces {
            write_surface(name("toptime", "surf"), &session.top_time)?;
            write_surface(name("bottime", "surf"), &session.bottom_time)?;
        }
        if flags.extra_params_time_segy || flags.extra_params_depth_segy {
            self.write_extra_parameters(session)?;
        }

        info!("outputs written to {}", self.dir.display());
        Ok(())
    }

    /// Extra parameters resampled per column onto the regular time and depth
    /// axes, one SEG-Y gate per parameter per domain.
    fn write_extra_parameters(&self, session: &Session) -> Result<()> {
        let settings = &session.settings;
        let g = &session.geometry;
        let nzrefl = session.nzrefl();
        let nt = g.nt();
        let nz = g.nz();
        let twt_axis: Vec<f64> = (0..nt).map(|n| g.t_min + (0.5 + n as f64) * g.dt).collect();
        let z_axis: Vec<f64> = (0..nz).map(|n| g.z_min + (0.5 + n as f64) * g.dz).collect();
        let segy_geometry = session
            .segy_geometry
            .as_ref()
            .expect("extra SEG-Y gates imply acquisition geometry");

        for (name_idx, param_name) in settings.extra_parameter_names.iter().enumerate() {
            let grid = &session.extra_grids[name_idx];
            let mut time_writer = if settings.output.extra_params_time_segy {
                Some(SegyWriter::create(
                    self.dir.join(format!(
                        "{}{}_time{}.segy",
                        self.prefix, param_name, self.suffix
                    )),
                    nt,
                    g.dt,
                    settings.scalco,
                )?)
            } else {
                None
            };
            let mut depth_writer = if settings.output.extra_params_depth_segy {
                Some(SegyWriter::create(
                    self.dir.join(format!(
                        "{}{}_depth{}.segy",
                        self.prefix, param_name, self.suffix
                    )),
                    nz,
                    g.dz,
                    settings.scalco,
                )?)
            } else {
                None
            };

            let mut il = segy_geometry.min_il();
            while il <= segy_geometry.max_il() {
                let mut xl = segy_geometry.min_xl();
                while xl <= segy_geometry.max_xl() {
                    let (i, j) = segy_geometry.find_index_from_ilxl(il, xl);
                    let (x, y) = segy_geometry.find_xy_from_ilxl(il, xl);
                    let twt_col: Vec<f64> =
                        (0..nzrefl).map(|k| session.twt_grid.get(i, j, k)).collect();
                    let z_col: Vec<f64> =
                        (0..nzrefl).map(|k| session.z_grid.get(i, j, k)).collect();
                    // Row k+1 of the parameter grid sits between reflectors
                    // k-1 and k, like the elastic rows.
                    let values: Vec<f64> =
                        (0..nzrefl).map(|k| grid.get(i, j, (k + 1).min(grid.nk - 1))).collect();
                    if let Some(writer) = time_writer.as_mut() {
                        let samples = interpolate_linear(&twt_col, &values, &twt_axis);
                        writer.write_trace(x, y, il, xl, &samples)?;
                    }
                    if let Some(writer) = depth_writer.as_mut() {
                        let samples = interpolate_linear(&z_col, &values, &z_axis);
                        writer.write_trace(x, y, il, xl, &samples)?;
                    }
                    xl += segy_geometry.xl_step();
                }
                il += segy_geometry.il_step();
            }
            if let Some(writer) = time_writer {
                writer.finish()?;
            }
            if let Some(writer) = depth_writer {
                writer.finish()?;
            }
        }
        Ok(())
    }
}

/// Write each gather column as one SEG-Y trace, windowed.
fn write_gather(
    writer: &mut FileSegy,
    result: &TraceResult,
    gather: &crate::grid::Grid2,
    window: AxisWindow,
) -> Result<()> {
    let hi = window.hi.min(gather.ni());
    for off in 0..gather.nj() {
        let samples: Vec<f64> = (window.lo..hi).map(|k| gather.get(k, off)).collect();
        writer.write_trace(result.x, result.y, result.il, result.xl, &samples)?;
    }
    Ok(())
}

/// Store a stacked column into a cube.
fn splat_stack(cube: &mut Grid3, result: &TraceResult, stack: &crate::grid::Grid2, window: AxisWindow) {
    if stack.ni() == 0 {
        return;
    }
    let hi = window.hi.min(stack.ni());
    for (k_out, k) in (window.lo..hi).enumerate() {
        if k_out < cube.nk {
            cube.set(result.i, result.j, k_out, stack.get(k, 0));
        }
    }
}

/// Plain ASCII surface dump: geometry line then row-major values.
fn write_surface<P: AsRef<Path>>(path: P, surface: &RegularSurface) -> Result<()> {
    let mut sink = BufWriter::new(File::create(path)?);
    writeln!(
        sink,
        "seis3d_surface {} {} {} {} {} {} {} {}",
        surface.x0,
        surface.y0,
        surface.dx,
        surface.dy,
        surface.angle,
        surface.nx,
        surface.ny,
        surface.missing,
    )?;
    for j in 0..surface.ny {
        for i in 0..surface.nx {
            write!(sink, "{} ", surface.get(i, j))?;
        }
        writeln!(sink)?;
    }
    sink.flush()?;
    Ok(())
}
