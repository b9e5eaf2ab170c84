//! `extern "C"` entry points mirroring this engine's native C ABI: a boolean
//! operation over two raw triangle meshes, and a constrained Delaunay
//! triangulation over CSR-encoded polygon faces. Every function here is a
//! thin marshalling layer over the safe API in the parent module and
//! `rexact_cdt` — no algorithmic work happens in this file.

use std::os::raw::{c_float, c_int};
use std::slice;

use rexact_cdt::{CdtInput, OutputMode};
use rexact_math::Vec2;

use crate::exact_f64::{r_from_f64, r_to_f64};
use crate::{boolean_mesh, BooleanOp, TriMesh};

#[repr(C)]
#[derive(Copy, Clone)]
pub enum BooleanOpC {
    None = 0,
    Isect = 1,
    Union = 2,
    Difference = 3,
}

impl From<BooleanOpC> for BooleanOp {
    fn from(op: BooleanOpC) -> Self {
        match op {
            BooleanOpC::None => BooleanOp::None,
            BooleanOpC::Isect => BooleanOp::Intersection,
            BooleanOpC::Union => BooleanOp::Union,
            BooleanOpC::Difference => BooleanOp::Difference,
        }
    }
}

#[repr(C)]
pub struct BooleanTrimeshInput {
    pub n: c_int,
    pub m: c_int,
    pub verts: *const [c_float; 3],
    pub tris: *const [c_int; 3],
}

#[repr(C)]
pub struct BooleanTrimeshOutput {
    pub n: c_int,
    pub m: c_int,
    pub verts: *mut [c_float; 3],
    pub tris: *mut [c_int; 3],
}

unsafe fn read_trimesh(input: &BooleanTrimeshInput) -> (Vec<[f64; 3]>, Vec<[u32; 3]>) {
    let verts = slice::from_raw_parts(input.verts, input.n as usize)
        .iter()
        .map(|v| [v[0] as f64, v[1] as f64, v[2] as f64])
        .collect();
    let tris = slice::from_raw_parts(input.tris, input.m as usize)
        .iter()
        .map(|t| [t[0] as u32, t[1] as u32, t[2] as u32])
        .collect();
    (verts, tris)
}

fn leak_trimesh(mesh: TriMesh) -> BooleanTrimeshOutput {
    let mut verts: Vec<[c_float; 3]> = mesh.verts.iter().map(|v| [v[0] as c_float, v[1] as c_float, v[2] as c_float]).collect();
    let mut tris: Vec<[c_int; 3]> = mesh.tris.iter().map(|t| [t[0] as c_int, t[1] as c_int, t[2] as c_int]).collect();
    let n = verts.len() as c_int;
    let m = tris.len() as c_int;
    let verts_ptr = verts.as_mut_ptr();
    let tris_ptr = tris.as_mut_ptr();
    std::mem::forget(verts);
    std::mem::forget(tris);
    BooleanTrimeshOutput { n, m, verts: verts_ptr, tris: tris_ptr }
}

/// Runs a boolean operation over two raw triangle meshes. `in1` may be null,
/// matching this ABI's documented self-boolean form: `in0` is then the only
/// operand, as if paired with an empty second mesh.
///
/// # Safety
/// `in0` must point at a valid `BooleanTrimeshInput` whose `verts` array
/// holds at least `n` elements and whose `tris` array holds at least `m`
/// elements. `in1`, if not null, must uphold the same requirement. The
/// returned output's buffers are heap-allocated and must eventually be
/// passed to [`rexact_free_trimesh`], exactly once.
#[no_mangle]
pub unsafe extern "C" fn BLI_boolean_trimesh(in0: *const BooleanTrimeshInput, in1: *const BooleanTrimeshInput, op: BooleanOpC) -> BooleanTrimeshOutput {
    let (v0, t0) = read_trimesh(&*in0);
    let result = if in1.is_null() {
        boolean_mesh(&[(v0.as_slice(), t0.as_slice())], op.into(), true)
    } else {
        let (v1, t1) = read_trimesh(&*in1);
        boolean_mesh(&[(v0.as_slice(), t0.as_slice()), (v1.as_slice(), t1.as_slice())], op.into(), true)
    };
    leak_trimesh(result.0)
}

/// Frees a [`BooleanTrimeshOutput`] previously returned by
/// [`BLI_boolean_trimesh`].
///
/// # Safety
/// `output` must have come from `BLI_boolean_trimesh` and must not already
/// have been freed.
#[no_mangle]
pub unsafe extern "C" fn rexact_free_trimesh(output: BooleanTrimeshOutput) {
    if !output.verts.is_null() {
        drop(Vec::from_raw_parts(output.verts, output.n as usize, output.n as usize));
    }
    if !output.tris.is_null() {
        drop(Vec::from_raw_parts(output.tris, output.m as usize, output.m as usize));
    }
}

#[repr(C)]
#[derive(Copy, Clone)]
pub enum CdtOutputModeC {
    Full = 0,
    Inside = 1,
    Constraints = 2,
    ConstraintsValidBmesh = 3,
}

impl From<CdtOutputModeC> for OutputMode {
    fn from(mode: CdtOutputModeC) -> Self {
        match mode {
            CdtOutputModeC::Full => OutputMode::Full,
            CdtOutputModeC::Inside => OutputMode::Inside,
            CdtOutputModeC::Constraints => OutputMode::Constraints,
            CdtOutputModeC::ConstraintsValidBmesh => OutputMode::ConstraintsValidBmesh,
        }
    }
}

/// Polygon faces are CSR-encoded: `face_offsets` has `n_faces + 1` entries,
/// and face `i`'s vertex indices are `face_verts[face_offsets[i]..face_offsets[i+1]]`.
#[repr(C)]
pub struct Cdt2dInput {
    pub n_verts: c_int,
    pub verts: *const [c_float; 2],
    pub n_edges: c_int,
    pub edges: *const [c_int; 2],
    pub n_faces: c_int,
    pub face_offsets: *const c_int,
    pub face_verts: *const c_int,
    /// Merge tolerance; `0.0` selects this crate's own default.
    pub eps: c_float,
}

#[repr(C)]
pub struct Cdt2dOutput {
    pub n_verts: c_int,
    pub verts: *mut [c_float; 2],
    pub n_edges: c_int,
    pub edges: *mut [c_int; 2],
    pub n_faces: c_int,
    pub faces: *mut [c_int; 3],
    /// `0` on success; `-1` if `input`'s face loops self-intersected, in
    /// which case the rest of the output is left zeroed.
    pub ok: c_int,
}

unsafe fn read_cdt_input(input: &Cdt2dInput) -> CdtInput {
    let points = slice::from_raw_parts(input.verts, input.n_verts as usize)
        .iter()
        .map(|v| Vec2::new(r_from_f64(v[0] as f64), r_from_f64(v[1] as f64)))
        .collect();
    let edges = slice::from_raw_parts(input.edges, input.n_edges as usize).iter().map(|e| (e[0] as u32, e[1] as u32)).collect();

    let offsets = slice::from_raw_parts(input.face_offsets, input.n_faces as usize + 1);
    let face_verts = slice::from_raw_parts(input.face_verts, offsets[input.n_faces as usize] as usize);
    let faces = (0..input.n_faces as usize)
        .map(|i| face_verts[offsets[i] as usize..offsets[i + 1] as usize].iter().map(|&v| v as u32).collect())
        .collect();

    // `rexact_cdt::calc` itself substitutes its own default whenever `eps`
    // signs to zero, so passing `0.0` straight through is enough.
    CdtInput { points, edges, faces, eps: r_from_f64(input.eps as f64) }
}

fn zeroed_cdt_output() -> Cdt2dOutput {
    Cdt2dOutput { n_verts: 0, verts: std::ptr::null_mut(), n_edges: 0, edges: std::ptr::null_mut(), n_faces: 0, faces: std::ptr::null_mut(), ok: -1 }
}

/// Runs a constrained Delaunay triangulation over CSR-encoded 2D polygon
/// input.
///
/// # Safety
/// `input`'s pointers must be valid for the lengths their companion `n_*`
/// fields describe, and `face_offsets` must hold `n_faces + 1` non-decreasing
/// entries. The returned output's buffers must eventually be passed to
/// [`rexact_free_cdt_output`], exactly once, unless `ok == -1`.
#[no_mangle]
pub unsafe extern "C" fn delaunay_2d_cdt_calc(input: *const Cdt2dInput, output_mode: CdtOutputModeC) -> Cdt2dOutput {
    let cdt_input = read_cdt_input(&*input);
    let out = match rexact_cdt::calc(&cdt_input, output_mode.into()) {
        Ok(out) => out,
        Err(_) => return zeroed_cdt_output(),
    };

    let mut verts: Vec<[c_float; 2]> = out.verts.iter().map(|v| [r_to_f64(&v.x) as c_float, r_to_f64(&v.y) as c_float]).collect();
    let mut edges: Vec<[c_int; 2]> = out.edges.iter().map(|&(a, b)| [a as c_int, b as c_int]).collect();
    let mut faces: Vec<[c_int; 3]> = out.faces.iter().map(|f| [f[0] as c_int, f[1] as c_int, f[2] as c_int]).collect();

    let n_verts = verts.len() as c_int;
    let n_edges = edges.len() as c_int;
    let n_faces = faces.len() as c_int;
    let verts_ptr = verts.as_mut_ptr();
    let edges_ptr = edges.as_mut_ptr();
    let faces_ptr = faces.as_mut_ptr();
    std::mem::forget(verts);
    std::mem::forget(edges);
    std::mem::forget(faces);

    Cdt2dOutput { n_verts, verts: verts_ptr, n_edges, edges: edges_ptr, n_faces, faces: faces_ptr, ok: 0 }
}

/// Frees a [`Cdt2dOutput`] previously returned by [`delaunay_2d_cdt_calc`]
/// with `ok == 0`.
///
/// # Safety
/// `output` must have come from `delaunay_2d_cdt_calc` and must not already
/// have been freed.
#[no_mangle]
pub unsafe extern "C" fn rexact_free_cdt_output(output: Cdt2dOutput) {
    if !output.verts.is_null() {
        drop(Vec::from_raw_parts(output.verts, output.n_verts as usize, output.n_verts as usize));
    }
    if !output.edges.is_null() {
        drop(Vec::from_raw_parts(output.edges, output.n_edges as usize, output.n_edges as usize));
    }
    if !output.faces.is_null() {
        drop(Vec::from_raw_parts(output.faces, output.n_faces as usize, output.n_faces as usize));
    }
}
