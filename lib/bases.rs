//! Orthonormal operator bases for qudit subsystems.
//!
//! A [`PauliBasis`] is an ordered set of Hermitian `d × d` matrices that are
//! orthonormal under the Hilbert–Schmidt inner product Tr(*A*<sup>†</sup>*B*).
//! States and channels are expanded over such bases: a density matrix becomes
//! a real coefficient vector, a channel becomes a real Pauli transfer matrix.
//!
//! Two generating families are provided:
//! - [`general`]: the d² projectors ∣i⟩⟨i∣ followed by the symmetrized
//!   off-diagonal ("coherence") operators, which spans all complex `d × d`
//!   matrices and keeps the computational populations as individual elements;
//! - [`gell_mann`]: the normalized identity plus the traceless generalized
//!   Gell-Mann generators, the natural choice when the dominant physical
//!   structure is diagonal (for d = 2 this is the familiar (I, X, Y, Z)/√2).
//!
//! A [subbasis](PauliBasis::subbasis) restricts a basis to an ordered index
//! subset; marking a subsystem as classical (populations only, no coherence)
//! this way is what lets [`Operation::compile`][crate::operation::Operation]
//! emit lower-dimensional kernels.
//!
//! Full bases are expensive to regenerate, so they are built once per
//! `(kind, dimension)` pair and shared behind an [`Arc`].

use std::sync::{ Arc, Mutex };
use ndarray as nd;
use num_complex::Complex64 as C64;
use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use crate::error::{ Error, Result };

/// Matrix-element tolerance when classifying basis vectors.
const ELEM_TOL: f64 = 1e-12;

/// Generating family of a [`PauliBasis`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    /// Projectors plus symmetrized coherence operators; see [`general`].
    General,
    /// Normalized identity plus traceless generators; see [`gell_mann`].
    GellMann,
}

/// An ordered, Hilbert–Schmidt-orthonormal set of Hermitian operators on a
/// `d`-dimensional qudit, possibly restricted to a subset of a full basis.
///
/// Two bases compare equal when they hold the same element indices of the
/// same parent basis; the numeric vectors are determined by that data and
/// are not compared directly.
#[derive(Clone, Debug)]
pub struct PauliBasis {
    kind: Kind,
    dim_hilbert: usize,
    vectors: Vec<nd::Array2<C64>>,
    labels: Vec<String>,
    indices: Vec<usize>,
}

impl PartialEq for PauliBasis {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.dim_hilbert == other.dim_hilbert
            && self.indices == other.indices
    }
}

impl Eq for PauliBasis { }

impl std::hash::Hash for PauliBasis {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.dim_hilbert.hash(state);
        self.indices.hash(state);
    }
}

impl PauliBasis {
    /// The qudit (Hilbert-space) dimension `d`.
    pub fn dim_hilbert(&self) -> usize { self.dim_hilbert }

    /// The number of basis elements (`d²` for a full basis).
    pub fn dim_pauli(&self) -> usize { self.vectors.len() }

    /// The basis operators, in order.
    pub fn vectors(&self) -> &[nd::Array2<C64>] { &self.vectors }

    /// Human-readable element labels, in order.
    pub fn labels(&self) -> &[String] { &self.labels }

    /// Positions of the contained elements within the full parent basis.
    pub fn indices(&self) -> &[usize] { &self.indices }

    /// The generating family of the parent basis.
    pub fn kind(&self) -> Kind { self.kind }

    /// Return `true` if this basis spans the full `d²`-dimensional operator
    /// space.
    pub fn is_full(&self) -> bool { self.dim_pauli() == self.dim_hilbert.pow(2) }

    /// The full basis of the same kind and dimension that this basis is a
    /// restriction of.
    pub fn superbasis(&self) -> Arc<Self> { cached(self.kind, self.dim_hilbert) }

    /// Restrict to an ordered subset of this basis's elements.
    ///
    /// `positions` index into `self`; for an already-restricted basis they
    /// compose through to the parent indices, so a subbasis of a subbasis is
    /// still a subbasis of the original full basis.
    pub fn subbasis(&self, positions: &[usize]) -> Result<Arc<Self>> {
        let np = self.dim_pauli();
        if let Some(&bad) = positions.iter().find(|p| **p >= np) {
            return Err(Error::IndexOutOfRange { index: bad, len: np });
        }
        Ok(Arc::new(self.select(positions)))
    }

    /// The subbasis of elements that are single computational-state
    /// projectors ∣i⟩⟨i∣, the "classical" directions of the basis.
    ///
    /// For a full [`general`] basis this is the first `d` elements; for a
    /// Gell-Mann basis it is empty.
    pub fn computational_subbasis(&self) -> Arc<Self> {
        let positions: Vec<usize> = self.vectors.iter().enumerate()
            .filter(|(_, v)| is_projector(v))
            .map(|(k, _)| k)
            .collect();
        Arc::new(self.select(&positions))
    }

    fn select(&self, positions: &[usize]) -> Self {
        Self {
            kind: self.kind,
            dim_hilbert: self.dim_hilbert,
            vectors: positions.iter()
                .map(|p| self.vectors[*p].clone()).collect(),
            labels: positions.iter()
                .map(|p| self.labels[*p].clone()).collect(),
            indices: positions.iter()
                .map(|p| self.indices[*p]).collect(),
        }
    }
}

/// Return `true` if `m` equals ∣i⟩⟨i∣ for some computational state `i`.
fn is_projector(m: &nd::Array2<C64>) -> bool {
    let mut ones: usize = 0;
    for ((i, j), v) in m.indexed_iter() {
        if i == j && (*v - C64::from(1.0)).norm() < ELEM_TOL {
            ones += 1;
        } else if v.norm() >= ELEM_TOL {
            return false;
        }
    }
    ones == 1
}

static CACHE: Lazy<Mutex<FxHashMap<(Kind, usize), Arc<PauliBasis>>>> =
    Lazy::new(|| Mutex::new(FxHashMap::default()));

/// Fetch or build the full basis for a (kind, dimension) pair.
///
/// Infallible for `dim >= 1`; public entry points validate the dimension.
pub(crate) fn cached(kind: Kind, dim: usize) -> Arc<PauliBasis> {
    let mut cache = CACHE.lock().unwrap_or_else(|e| e.into_inner());
    cache.entry((kind, dim))
        .or_insert_with(|| {
            Arc::new(
                match kind {
                    Kind::General => build_general(dim),
                    Kind::GellMann => build_gell_mann(dim),
                }
            )
        })
        .clone()
}

/// The full `d²`-element "general" basis spanning all complex `d × d`
/// matrices.
///
/// Element order: the `d` projectors ∣i⟩⟨i∣ (labels `"0"`, `"1"`, …), then
/// for each pair `i > j` the operators
/// X<sub>ij</sub> = (∣i⟩⟨j∣ + ∣j⟩⟨i∣)/√2 and
/// Y<sub>ij</sub> = (i∣i⟩⟨j∣ − i∣j⟩⟨i∣)/√2 (labels `"X10"`, `"Y10"`, …),
/// pairs in the order (1,0), (2,0), (2,1), ….
pub fn general(dim: usize) -> Result<Arc<PauliBasis>> {
    if dim == 0 { return Err(Error::InvalidDimension(dim)); }
    Ok(cached(Kind::General, dim))
}

/// The full `d²`-element Gell-Mann-type basis: I/√d first, then the same
/// off-diagonal generators as [`general`], then the `d − 1` traceless
/// diagonal generators diag(1, …, 1, −k, 0, …)/√(k(k+1)) (labels `"Z1"`, …).
///
/// For d = 2 this is (I, X, Y, Z)/√2, whose first element makes the
/// trace-preservation row of a PTM equal to (1, 0, 0, 0).
pub fn gell_mann(dim: usize) -> Result<Arc<PauliBasis>> {
    if dim == 0 { return Err(Error::InvalidDimension(dim)); }
    Ok(cached(Kind::GellMann, dim))
}

fn offdiag_pairs(
    d: usize,
    vectors: &mut Vec<nd::Array2<C64>>,
    labels: &mut Vec<String>,
) {
    use std::f64::consts::FRAC_1_SQRT_2 as SQRT05;
    for i in 1..d {
        for j in 0..i {
            let mut x: nd::Array2<C64> = nd::Array2::zeros((d, d));
            x[[i, j]] = SQRT05.into();
            x[[j, i]] = SQRT05.into();
            vectors.push(x);
            labels.push(format!("X{}{}", i, j));
            let mut y: nd::Array2<C64> = nd::Array2::zeros((d, d));
            y[[i, j]] = C64::i() * SQRT05;
            y[[j, i]] = -C64::i() * SQRT05;
            vectors.push(y);
            labels.push(format!("Y{}{}", i, j));
        }
    }
}

fn build_general(d: usize) -> PauliBasis {
    let mut vectors: Vec<nd::Array2<C64>> = Vec::with_capacity(d * d);
    let mut labels: Vec<String> = Vec::with_capacity(d * d);
    for i in 0..d {
        let mut m: nd::Array2<C64> = nd::Array2::zeros((d, d));
        m[[i, i]] = 1.0.into();
        vectors.push(m);
        labels.push(i.to_string());
    }
    offdiag_pairs(d, &mut vectors, &mut labels);
    PauliBasis {
        kind: Kind::General,
        dim_hilbert: d,
        vectors,
        labels,
        indices: (0..d * d).collect(),
    }
}

fn build_gell_mann(d: usize) -> PauliBasis {
    let mut vectors: Vec<nd::Array2<C64>> = Vec::with_capacity(d * d);
    let mut labels: Vec<String> = Vec::with_capacity(d * d);
    let norm = C64::from(1.0 / (d as f64).sqrt());
    vectors.push(nd::Array2::eye(d) * norm);
    labels.push("I".to_string());
    offdiag_pairs(d, &mut vectors, &mut labels);
    for k in 1..d {
        let norm = 1.0 / ((k * (k + 1)) as f64).sqrt();
        let mut m: nd::Array2<C64> = nd::Array2::zeros((d, d));
        for i in 0..k { m[[i, i]] = norm.into(); }
        m[[k, k]] = (-(k as f64) * norm).into();
        vectors.push(m);
        labels.push(format!("Z{}", k));
    }
    PauliBasis {
        kind: Kind::GellMann,
        dim_hilbert: d,
        vectors,
        labels,
        indices: (0..d * d).collect(),
    }
}
