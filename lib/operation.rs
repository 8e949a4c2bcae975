//! Quantum channels over a fixed tuple of subsystems, with composition,
//! basis optimization, and compilation into dense numeric kernels.
//!
//! An [`Operation`] is immutable and shareable: it can be applied to any
//! number of states. Internally it holds exactly one canonical
//! representation (a Kraus stack or a PTM tensor, chosen at construction)
//! and derives PTMs in other bases on demand through [`crate::algebra`],
//! memoizing each result by the exact basis-tuple pair.
//!
//! The central optimization is [`Operation::optimal_bases`]: given the bases
//! actually populated by the caller's state (which may be truncated,
//! "classical" subbases), it finds the smallest sufficient output subbases
//! and tightens the inputs to the directions the channel actually reads.
//! [`Operation::compile`] then materializes the PTM in those bases, so a
//! classical subsystem flows through a lower-dimensional kernel than a
//! quantum one.

use std::sync::{ Arc, Mutex };
use itertools::Itertools;
use ndarray as nd;
use num_complex::Complex64 as C64;
use rustc_hash::FxHashMap;
use crate::{
    algebra,
    bases::{ self, PauliBasis },
    error::{ Error, Result },
};

/// Negligibility threshold for PTM rows and columns during basis pruning.
///
/// Shared by [`Operation::optimal_bases`] and [`Operation::compile`]; with a
/// hard threshold and ordered index retention, ties resolve in favor of
/// lower-index (canonical) basis elements automatically.
pub const OPT_TOL: f64 = 1e-10;

/// Canonical stored representation of a channel.
#[derive(Clone, Debug)]
enum Repr {
    /// Stack of Kraus operators, side length = Π subsystem Hilbert dims.
    Kraus(nd::Array3<C64>),
    /// Real PTM tensor of shape (out_1, …, out_n, in_1, …, in_n) in the
    /// operation's declared bases.
    Ptm(nd::ArrayD<f64>),
}

type BasisTuple = Vec<Arc<PauliBasis>>;
type PtmKey = (BasisTuple, BasisTuple);

/// An immutable quantum channel acting on an ordered tuple of subsystems.
#[derive(Debug)]
pub struct Operation {
    repr: Repr,
    bases_in: BasisTuple,
    bases_out: BasisTuple,
    qubits: Vec<usize>,
    // memoized PTMs; recomputation under a race is fine, corruption is not
    cache: Mutex<FxHashMap<PtmKey, Arc<nd::ArrayD<f64>>>>,
}

impl Clone for Operation {
    fn clone(&self) -> Self {
        Self {
            repr: self.repr.clone(),
            bases_in: self.bases_in.clone(),
            bases_out: self.bases_out.clone(),
            qubits: self.qubits.clone(),
            cache: Mutex::new(FxHashMap::default()),
        }
    }
}

impl Operation {
    fn new(repr: Repr, bases_in: BasisTuple, bases_out: BasisTuple) -> Self {
        let qubits: Vec<usize> = (0..bases_in.len()).collect();
        Self {
            repr,
            bases_in,
            bases_out,
            qubits,
            cache: Mutex::new(FxHashMap::default()),
        }
    }

    /// Construct from an explicit stack of Kraus operators.
    ///
    /// The stack's trailing two axes must be square with side length equal
    /// to the product of the subsystem Hilbert dimensions of `bases`, which
    /// serve as both the input and output bases.
    pub fn from_kraus(kraus: nd::Array3<C64>, bases: &[Arc<PauliBasis>])
        -> Result<Self>
    {
        if bases.is_empty() {
            return Err(Error::DimensionMismatch { expected: 1, got: 0 });
        }
        let dim: usize = bases.iter().map(|b| b.dim_hilbert()).product();
        let shape = kraus.shape();
        if shape[1] != dim || shape[2] != dim {
            return Err(Error::Shape {
                expected: vec![shape[0], dim, dim],
                got: shape.to_vec(),
            });
        }
        Ok(Self::new(Repr::Kraus(kraus), bases.to_vec(), bases.to_vec()))
    }

    /// Construct from a single unitary (or other one-element Kraus stack).
    pub fn from_unitary(unitary: nd::Array2<C64>, bases: &[Arc<PauliBasis>])
        -> Result<Self>
    {
        Self::from_kraus(unitary.insert_axis(nd::Axis(0)), bases)
    }

    /// Statically-known-valid constructor for the curated operation library.
    pub(crate) fn from_kraus_unchecked(
        kraus: nd::Array3<C64>,
        bases: &[Arc<PauliBasis>],
    ) -> Self {
        Self::new(Repr::Kraus(kraus), bases.to_vec(), bases.to_vec())
    }

    /// Construct directly from a PTM tensor expressed in the given bases.
    pub fn from_ptm(
        ptm: nd::ArrayD<f64>,
        bases_in: &[Arc<PauliBasis>],
        bases_out: &[Arc<PauliBasis>],
    ) -> Result<Self> {
        algebra::check_tuples(bases_in, bases_out)?;
        let shape = algebra::pauli_shape(bases_out, bases_in);
        if ptm.shape() != shape.as_slice() {
            return Err(Error::Shape {
                expected: shape,
                got: ptm.shape().to_vec(),
            });
        }
        Ok(Self::new(Repr::Ptm(ptm), bases_in.to_vec(), bases_out.to_vec()))
    }

    pub(crate) fn from_ptm_unchecked(
        ptm: nd::ArrayD<f64>,
        bases_in: &[Arc<PauliBasis>],
        bases_out: &[Arc<PauliBasis>],
    ) -> Self {
        Self::new(Repr::Ptm(ptm), bases_in.to_vec(), bases_out.to_vec())
    }

    /// The number of subsystems this operation acts on.
    pub fn num_subsystems(&self) -> usize { self.bases_in.len() }

    /// The subsystem slots (within a larger system) this operation
    /// addresses.
    pub fn qubits(&self) -> &[usize] { &self.qubits }

    /// Declared per-subsystem input bases.
    pub fn bases_in(&self) -> &[Arc<PauliBasis>] { &self.bases_in }

    /// Declared per-subsystem output bases.
    pub fn bases_out(&self) -> &[Arc<PauliBasis>] { &self.bases_out }

    /// The PTM tensor shape in the declared bases:
    /// (out_1, …, out_n, in_1, …, in_n).
    pub fn shape(&self) -> Vec<usize> {
        algebra::pauli_shape(&self.bases_out, &self.bases_in)
    }

    /// Reindex which subsystem slots this operation addresses.
    ///
    /// Pure relabeling; the numeric content is unchanged.
    pub fn at(&self, qubits: &[usize]) -> Result<Self> {
        if qubits.len() != self.num_subsystems() {
            return Err(Error::DimensionMismatch {
                expected: self.num_subsystems(),
                got: qubits.len(),
            });
        }
        let mut op = self.clone();
        op.qubits = qubits.to_vec();
        Ok(op)
    }

    fn check_bases(&self, bases: &[Arc<PauliBasis>]) -> Result<()> {
        if bases.len() != self.num_subsystems() {
            return Err(Error::DimensionMismatch {
                expected: self.num_subsystems(),
                got: bases.len(),
            });
        }
        for (b, d) in bases.iter().zip(&self.bases_in) {
            if b.dim_hilbert() != d.dim_hilbert() {
                return Err(Error::DimensionMismatch {
                    expected: d.dim_hilbert(),
                    got: b.dim_hilbert(),
                });
            }
        }
        Ok(())
    }

    /// The PTM of this operation in the requested bases, derived from the
    /// stored representation and memoized per basis-tuple pair.
    pub fn ptm(
        &self,
        bases_in: &[Arc<PauliBasis>],
        bases_out: &[Arc<PauliBasis>],
    ) -> Result<Arc<nd::ArrayD<f64>>> {
        self.check_bases(bases_in)?;
        self.check_bases(bases_out)?;
        let key: PtmKey = (bases_in.to_vec(), bases_out.to_vec());
        if let Some(hit)
            = self.cache.lock().unwrap_or_else(|e| e.into_inner()).get(&key)
        {
            return Ok(Arc::clone(hit));
        }
        let computed: nd::ArrayD<f64>
            = match &self.repr {
                Repr::Kraus(kraus)
                    => algebra::kraus_to_ptm(kraus, bases_in, bases_out)?,
                Repr::Ptm(ptm)
                    => algebra::ptm_convert_basis(
                        ptm,
                        &self.bases_in, &self.bases_out,
                        bases_in, bases_out,
                    )?,
            };
        let computed = Arc::new(computed);
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        Ok(Arc::clone(cache.entry(key).or_insert(computed)))
    }

    /// Given the input basis actually available at each subsystem, compute
    /// the smallest sufficient output subbases and the tightened input
    /// subbases.
    ///
    /// Output elements whose PTM row is negligible (below [`OPT_TOL`])
    /// across all inputs are dropped; input elements whose column is
    /// negligible across the retained outputs are dropped likewise. Returns
    /// `(bases_in, bases_out)`.
    pub fn optimal_bases(&self, bases_in: &[Arc<PauliBasis>])
        -> Result<(BasisTuple, BasisTuple)>
    {
        let full_out: BasisTuple
            = self.bases_out.iter().map(|b| b.superbasis()).collect();
        let ptm = self.ptm(bases_in, &full_out)?;
        let n = self.num_subsystems();
        let mut out_used: Vec<Vec<bool>>
            = full_out.iter().map(|b| vec![false; b.dim_pauli()]).collect();
        let mut in_used: Vec<Vec<bool>>
            = bases_in.iter().map(|b| vec![false; b.dim_pauli()]).collect();
        for (idx, v) in ptm.indexed_iter() {
            if v.abs() > OPT_TOL {
                for i in 0..n {
                    out_used[i][idx[i]] = true;
                    in_used[i][idx[n + i]] = true;
                }
            }
        }
        let opt_out = select_bases(&full_out, &out_used)?;
        let opt_in = select_bases(bases_in, &in_used)?;
        Ok((opt_in, opt_out))
    }

    /// Produce the dense numeric kernel of this operation for the given
    /// input bases: the PTM projected to [`Operation::optimal_bases`] when
    /// `bases_out` is unspecified, otherwise to the given output bases with
    /// the inputs still tightened against them.
    ///
    /// The returned operation's [`shape`](Operation::shape) reflects the
    /// pruned per-subsystem basis sizes, which may be smaller than the full
    /// `dim_pauli`; this is how classical subsystems get lower-dimensional
    /// kernels than quantum ones.
    pub fn compile(
        &self,
        bases_in: &[Arc<PauliBasis>],
        bases_out: Option<&[Arc<PauliBasis>]>,
    ) -> Result<Self> {
        let (bi, bo) = match bases_out {
            None => self.optimal_bases(bases_in)?,
            Some(bo) => {
                let ptm = self.ptm(bases_in, bo)?;
                let n = self.num_subsystems();
                let mut in_used: Vec<Vec<bool>> = bases_in.iter()
                    .map(|b| vec![false; b.dim_pauli()]).collect();
                for (idx, v) in ptm.indexed_iter() {
                    if v.abs() > OPT_TOL {
                        for i in 0..n { in_used[i][idx[n + i]] = true; }
                    }
                }
                (select_bases(bases_in, &in_used)?, bo.to_vec())
            },
        };
        let ptm = self.ptm(&bi, &bo)?;
        let mut op = Self::from_ptm_unchecked((*ptm).clone(), &bi, &bo);
        op.qubits = self.qubits.clone();
        Ok(op)
    }

    /// Compose operations acting on (possibly different, possibly
    /// overlapping) subsystem slots into one operation over the sorted
    /// union of all addressed slots, applied in argument order.
    ///
    /// Each operand is promoted to its PTM in the full general bases,
    /// embedded into the union with the identity on untouched subsystems,
    /// and matrix-multiplied in time order: the rightmost argument is
    /// applied last and therefore becomes the leftmost matrix factor.
    pub fn from_sequence(ops: &[Self]) -> Result<Self> {
        if ops.is_empty() {
            return Err(Error::DimensionMismatch { expected: 1, got: 0 });
        }
        // union of addressed slots and their Hilbert dimensions
        let mut dims: FxHashMap<usize, usize> = FxHashMap::default();
        for op in ops {
            for (q, b) in op.qubits.iter().zip(&op.bases_in) {
                let d = b.dim_hilbert();
                if let Some(prev) = dims.insert(*q, d) {
                    if prev != d {
                        return Err(Error::DimensionMismatch {
                            expected: prev,
                            got: d,
                        });
                    }
                }
            }
        }
        let union: Vec<usize> = dims.keys().copied().sorted().collect();
        let full: BasisTuple = union.iter()
            .map(|q| bases::general(dims[q]))
            .collect::<Result<_>>()?;
        let pauli_dims: Vec<usize>
            = full.iter().map(|b| b.dim_pauli()).collect();
        let strides = c_order_strides(&pauli_dims);
        let total_dim: usize = pauli_dims.iter().product();

        let mut total: nd::Array2<f64> = nd::Array2::eye(total_dim);
        for op in ops {
            let op_bases: BasisTuple = op.qubits.iter()
                .map(|q| bases::general(dims[q]))
                .collect::<Result<_>>()?;
            let op_dims: Vec<usize>
                = op_bases.iter().map(|b| b.dim_pauli()).collect();
            let op_size: usize = op_dims.iter().product();
            let ptm = op.ptm(&op_bases, &op_bases)?;
            let flat = ptm.view().into_shape((op_size, op_size))
                .map_err(|_| Error::Shape {
                    expected: vec![op_size, op_size],
                    got: ptm.shape().to_vec(),
                })?;
            // union strides of the op's own subsystems, in op order
            let op_strides: Vec<usize> = op.qubits.iter()
                .map(|q| {
                    let pos = union.iter().position(|u| u == q)
                        .ok_or(Error::IndexOutOfRange {
                            index: *q,
                            len: union.len(),
                        })?;
                    Ok(strides[pos])
                })
                .collect::<Result<_>>()?;
            let rest: Vec<usize> = union.iter().enumerate()
                .filter(|(_, q)| !op.qubits.contains(q))
                .map(|(pos, _)| pos)
                .collect();
            let mut embedded: nd::Array2<f64>
                = nd::Array2::zeros((total_dim, total_dim));
            let offsets = digit_offsets(&op_dims, &op_strides);
            let rests = rest_offsets(&rest, &pauli_dims, &strides);
            for (x, row_off) in offsets.iter().enumerate() {
                for (y, col_off) in offsets.iter().enumerate() {
                    let v = flat[[x, y]];
                    if v == 0.0 { continue; }
                    for r in rests.iter() {
                        embedded[[row_off + r, col_off + r]] = v;
                    }
                }
            }
            total = embedded.dot(&total);
        }
        let shape: Vec<usize> = pauli_dims.iter().chain(&pauli_dims)
            .copied().collect();
        let tensor = total.into_shape(nd::IxDyn(&shape))
            .map_err(|_| Error::Shape { expected: shape, got: Vec::new() })?;
        let mut op = Self::from_ptm_unchecked(tensor, &full, &full);
        op.qubits = union;
        Ok(op)
    }
}

/// Restrict each basis to its used positions, preserving order.
fn select_bases(bases: &[Arc<PauliBasis>], used: &[Vec<bool>])
    -> Result<BasisTuple>
{
    bases.iter().zip(used)
        .map(|(b, u)| {
            let positions: Vec<usize> = u.iter().enumerate()
                .filter(|(_, keep)| **keep)
                .map(|(k, _)| k)
                .collect();
            b.subbasis(&positions)
        })
        .collect()
}

/// C-order strides for a shape: `strides[k] = Π_{l > k} dims[l]`.
fn c_order_strides(dims: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; dims.len()];
    for k in (0..dims.len().saturating_sub(1)).rev() {
        strides[k] = strides[k + 1] * dims[k + 1];
    }
    strides
}

/// Flat union offsets of every digit combination of a multi-index with the
/// given per-digit sizes and (union) strides, in C order.
fn digit_offsets(dims: &[usize], strides: &[usize]) -> Vec<usize> {
    dims.iter().map(|d| 0..*d)
        .multi_cartesian_product()
        .map(|digits| {
            digits.iter().zip(strides).map(|(dg, s)| dg * s).sum()
        })
        .collect()
}

/// Offsets contributed by the untouched subsystems of an embedding.
///
/// An operation covering the whole union has no untouched subsystems; the
/// single offset is then 0.
fn rest_offsets(rest: &[usize], dims: &[usize], strides: &[usize])
    -> Vec<usize>
{
    if rest.is_empty() { return vec![0]; }
    rest.iter().map(|pos| (0..dims[*pos]).map(|dg| dg * strides[*pos]))
        .multi_cartesian_product()
        .map(|offs| offs.into_iter().sum())
        .collect()
}
