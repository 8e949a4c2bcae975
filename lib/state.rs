//! Dense Pauli-vector state backend for systems of qubits.
//!
//! A [`State`] stores an N-qubit density matrix as its real coefficient
//! vector over the full general basis of every qubit: a flat `Vec<f64>` of
//! live length 4^N, where qubit `i`'s basis digit occupies stride `4^i`.
//! The digit values follow the general-basis element order, so digits 0 and
//! 1 are the two populations and digits 2 and 3 the real and imaginary
//! coherences; the diagonal of the density matrix lives on the indices
//! whose digits are all 0 or 1.
//!
//! Operations are applied in place as real superoperator kernels. The
//! two-qubit kernel is pluggable through [`TwoQubitKernel`], with
//! [`DirectKernel`] as the default and [`GeneralKernel`] as an
//! interchangeable cross-check.
//!
//! States are single-threaded by contract and hold no locks.

use std::fmt;
use std::sync::Arc;
use ndarray as nd;
use num_complex::Complex64 as C64;
use rustc_hash::FxHashMap;
use crate::{
    algebra,
    bases::{ self, Kind, PauliBasis },
    error::{ Error, Result },
    operation::Operation,
};

/// Hard cap on the number of qubits in a [`State`]; the Pauli vector holds
/// 4^N doubles.
pub const MAX_QUBITS: usize = 15;

/// Cap on the qubit count for diagonal readout paths ([`State::trace`],
/// [`State::get_diag`], [`State::partial_trace`]), which materialize 2^N
/// entries.
pub const MAX_DIAG_QUBITS: usize = 10;

/// Strategy for applying a 16×16 real superoperator kernel to two qubit
/// digits of a flat Pauli vector.
///
/// `ptm` is row-major with the composite digit order (bit0, bit1), bit0
/// most significant; `data` is the live prefix of the state vector.
pub trait TwoQubitKernel: fmt::Debug {
    fn apply_two_qubit(
        &self,
        data: &mut [f64],
        num_qubits: usize,
        bit0: usize,
        bit1: usize,
        ptm: &[f64],
    );
}

/// Gather/scatter kernel: enumerates the 4^(N−2) untouched digit
/// configurations and transforms each 16-element fiber in place.
#[derive(Copy, Clone, Debug, Default)]
pub struct DirectKernel;

impl TwoQubitKernel for DirectKernel {
    fn apply_two_qubit(
        &self,
        data: &mut [f64],
        num_qubits: usize,
        bit0: usize,
        bit1: usize,
        ptm: &[f64],
    ) {
        let s0 = 1 << (2 * bit0);
        let s1 = 1 << (2 * bit1);
        let (lo, hi) = if bit0 < bit1 { (bit0, bit1) } else { (bit1, bit0) };
        let s_lo = 1 << (2 * lo);
        let s_mid = 1 << (2 * (hi - 1)); // size of the (low, mid) digit space
        let fibers = 1 << (2 * (num_qubits - 2));
        let mut fiber = [0.0_f64; 16];
        for r in 0..fibers {
            let low = r % s_lo;
            let mid = (r / s_lo) % (s_mid / s_lo);
            let high = r / s_mid;
            let base = low + mid * (4 * s_lo) + high * (16 * s_mid);
            for e0 in 0..4 {
                for e1 in 0..4 {
                    fiber[4 * e0 + e1] = data[base + e0 * s0 + e1 * s1];
                }
            }
            for d in 0..16 {
                let mut acc = 0.0;
                for e in 0..16 {
                    acc += ptm[16 * d + e] * fiber[e];
                }
                data[base + (d / 4) * s0 + (d % 4) * s1] = acc;
            }
        }
    }
}

/// Generic strided kernel: normalizes the qubit order by transposing the
/// kernel, then recomputes every output entry by digit extraction over the
/// whole vector.
///
/// Slower than [`DirectKernel`] but shares no indexing logic with it, which
/// makes the pair a useful consistency check.
#[derive(Copy, Clone, Debug, Default)]
pub struct GeneralKernel;

impl TwoQubitKernel for GeneralKernel {
    fn apply_two_qubit(
        &self,
        data: &mut [f64],
        _num_qubits: usize,
        bit0: usize,
        bit1: usize,
        ptm: &[f64],
    ) {
        // canonical order: the lower bit index is the most significant
        // kernel digit
        let (lo, hi, kernel): (usize, usize, Vec<f64>) =
            if bit0 < bit1 {
                (bit0, bit1, ptm.to_vec())
            } else {
                let mut t = vec![0.0; 256];
                for a in 0..4 { for b in 0..4 { for c in 0..4 {
                    for d in 0..4 {
                        t[16 * (4 * b + a) + (4 * d + c)]
                            = ptm[16 * (4 * a + b) + (4 * c + d)];
                    }
                } } }
                (bit1, bit0, t)
            };
        let s_lo = 1 << (2 * lo);
        let s_hi = 1 << (2 * hi);
        let prior = data.to_vec();
        for (idx, out) in data.iter_mut().enumerate() {
            let d_lo = (idx / s_lo) % 4;
            let d_hi = (idx / s_hi) % 4;
            let base = idx - d_lo * s_lo - d_hi * s_hi;
            let row = 4 * d_lo + d_hi;
            let mut acc = 0.0;
            for e_lo in 0..4 {
                for e_hi in 0..4 {
                    acc += kernel[16 * row + 4 * e_lo + e_hi]
                        * prior[base + e_lo * s_lo + e_hi * s_hi];
                }
            }
            *out = acc;
        }
    }
}

/// A dense density matrix over N qubits in Pauli-vector form.
#[derive(Clone, Debug)]
pub struct State {
    // backing storage; only the first 4^num_qubits entries are live
    data: Vec<f64>,
    num_qubits: usize,
    // high-water mark of the backing storage, in qubits
    alloc_qubits: usize,
    kernel: Arc<dyn TwoQubitKernel>,
    // flattened kernels keyed by their exact bit pattern; unbounded, sized
    // by the number of distinct kernels ever applied to this state
    ptm_cache: FxHashMap<Vec<u64>, Arc<Vec<f64>>>,
}

impl State {
    /// All qubits in the ground state.
    pub fn new(num_qubits: usize) -> Result<Self> {
        Self::with_kernel(num_qubits, Arc::new(DirectKernel))
    }

    /// Ground state with an explicit two-qubit kernel strategy.
    pub fn with_kernel(num_qubits: usize, kernel: Arc<dyn TwoQubitKernel>)
        -> Result<Self>
    {
        check_capacity(num_qubits)?;
        let mut data = vec![0.0; 1 << (2 * num_qubits)];
        data[0] = 1.0;
        Ok(Self {
            data,
            num_qubits,
            alloc_qubits: num_qubits,
            kernel,
            ptm_cache: FxHashMap::default(),
        })
    }

    /// Wrap an existing Pauli vector of length 4^N.
    pub fn from_pv(num_qubits: usize, data: Vec<f64>) -> Result<Self> {
        check_capacity(num_qubits)?;
        let size = 1 << (2 * num_qubits);
        if data.len() != size {
            return Err(Error::Shape {
                expected: vec![size],
                got: vec![data.len()],
            });
        }
        Ok(Self {
            data,
            num_qubits,
            alloc_qubits: num_qubits,
            kernel: Arc::new(DirectKernel),
            ptm_cache: FxHashMap::default(),
        })
    }

    /// Convert a dense (2^N, 2^N) density matrix.
    pub fn from_dense(num_qubits: usize, dm: &nd::Array2<C64>)
        -> Result<Self>
    {
        check_capacity(num_qubits)?;
        let dim = 1 << num_qubits;
        if dm.shape() != [dim, dim] {
            return Err(Error::Shape {
                expected: vec![dim, dim],
                got: dm.shape().to_vec(),
            });
        }
        if num_qubits == 0 {
            return Self::from_pv(0, vec![dm[[0, 0]].re]);
        }
        let qubit_bases: Vec<Arc<PauliBasis>>
            = vec![bases::cached(Kind::General, 2); num_qubits];
        let pv = algebra::dm_to_pv(dm, &qubit_bases)?;
        Self::from_pv(num_qubits, pv.into_raw_vec())
    }

    /// The number of qubits currently live in this state.
    pub fn num_qubits(&self) -> usize { self.num_qubits }

    /// The live Pauli-vector coefficients.
    pub fn pv(&self) -> &[f64] {
        &self.data[..1 << (2 * self.num_qubits)]
    }

    /// Trace of the density matrix.
    pub fn trace(&self) -> Result<f64> {
        Ok(self.get_diag()?.iter().sum())
    }

    /// Rescale to trace one; returns the prior trace.
    pub fn renormalize(&mut self) -> Result<f64> {
        let tr = self.trace()?;
        let size = 1 << (2 * self.num_qubits);
        for x in &mut self.data[..size] { *x /= tr; }
        Ok(tr)
    }

    /// The 2^N diagonal entries of the density matrix, in computational
    /// order.
    pub fn get_diag(&self) -> Result<Vec<f64>> {
        check_diag_capacity(self.num_qubits)?;
        let diag: Vec<f64> = (0..1_usize << self.num_qubits)
            .map(|m| self.data[diag_index(m, self.num_qubits)])
            .collect();
        Ok(diag)
    }

    /// The unnormalized probabilities of finding `bit` in ∣0⟩ and ∣1⟩.
    pub fn partial_trace(&self, bit: usize) -> Result<(f64, f64)> {
        self.check_bit(bit)?;
        let diag = self.get_diag()?;
        let mut p = (0.0, 0.0);
        for (m, x) in diag.iter().enumerate() {
            if m >> bit & 1 == 0 { p.0 += *x; } else { p.1 += *x; }
        }
        Ok(p)
    }

    /// Reconstruct the dense (2^N, 2^N) density matrix.
    pub fn to_array(&self) -> Result<nd::Array2<C64>> {
        if self.num_qubits == 0 {
            return Ok(nd::array![[C64::from(self.data[0])]]);
        }
        let qubit_bases: Vec<Arc<PauliBasis>>
            = vec![bases::cached(Kind::General, 2); self.num_qubits];
        let shape: Vec<usize> = vec![4; self.num_qubits];
        let pv = nd::ArrayView::from_shape(nd::IxDyn(&shape), self.pv())
            .map_err(|_| Error::Shape {
                expected: shape.clone(),
                got: vec![self.pv().len()],
            })?;
        algebra::pv_to_dm(&pv.to_owned(), &qubit_bases)
    }

    /// Apply a 4×4 real superoperator to a single qubit, in place.
    pub fn apply_ptm(&mut self, bit: usize, ptm: &nd::Array2<f64>)
        -> Result<()>
    {
        self.check_bit(bit)?;
        let kernel = self.cached_kernel(ptm, 4)?;
        let size = 1 << (2 * self.num_qubits);
        apply_single(&mut self.data[..size], bit, &kernel);
        Ok(())
    }

    /// Apply a 16×16 real superoperator to a qubit pair, in place.
    ///
    /// The kernel's composite digits are ordered (bit0, bit1) with bit0
    /// most significant. The two bits must be distinct.
    pub fn apply_two_ptm(
        &mut self,
        bit0: usize,
        bit1: usize,
        ptm: &nd::Array2<f64>,
    ) -> Result<()> {
        self.check_bit(bit0)?;
        self.check_bit(bit1)?;
        if bit0 == bit1 {
            return Err(Error::DimensionMismatch { expected: 2, got: 1 });
        }
        let kernel = self.cached_kernel(ptm, 16)?;
        let size = 1 << (2 * self.num_qubits);
        self.kernel.apply_two_qubit(
            &mut self.data[..size], self.num_qubits, bit0, bit1, &kernel);
        Ok(())
    }

    /// Apply an operation to the qubits it addresses.
    ///
    /// The operation is promoted to its PTM in the full general bases and
    /// dispatched on arity; only one- and two-qubit operations on
    /// two-dimensional subsystems are supported by this backend.
    pub fn apply(&mut self, op: &Operation) -> Result<()> {
        for b in op.bases_in() {
            if b.dim_hilbert() != 2 {
                return Err(Error::DimensionMismatch {
                    expected: 2,
                    got: b.dim_hilbert(),
                });
            }
        }
        let n = op.num_subsystems();
        let full: Vec<Arc<PauliBasis>>
            = vec![bases::cached(Kind::General, 2); n];
        match (op.qubits(), n) {
            (&[bit], 1) => {
                let ptm = op.ptm(&full, &full)?;
                let flat = ptm.view().into_shape((4, 4))
                    .map_err(|_| Error::Shape {
                        expected: vec![4, 4],
                        got: ptm.shape().to_vec(),
                    })?;
                self.apply_ptm(bit, &flat.to_owned())
            },
            (&[bit0, bit1], 2) => {
                let ptm = op.ptm(&full, &full)?;
                let flat = ptm.view().into_shape((16, 16))
                    .map_err(|_| Error::Shape {
                        expected: vec![16, 16],
                        got: ptm.shape().to_vec(),
                    })?;
                self.apply_two_ptm(bit0, bit1, &flat.to_owned())
            },
            _ => Err(Error::DimensionMismatch { expected: 2, got: n }),
        }
    }

    /// Append a new highest-indexed qubit in ∣0⟩ or ∣1⟩.
    ///
    /// Backing storage above the high-water mark is reused rather than
    /// reallocated, so alternating [`project_measurement`] and
    /// `add_ancilla` cycles allocate only once.
    ///
    /// [`project_measurement`]: State::project_measurement
    pub fn add_ancilla(&mut self, excited: bool) -> Result<()> {
        check_capacity(self.num_qubits + 1)?;
        let sz = 1 << (2 * self.num_qubits);
        let block = usize::from(excited) * sz;
        if self.alloc_qubits == self.num_qubits {
            let mut grown = vec![0.0; 4 * sz];
            grown[block..block + sz].copy_from_slice(&self.data[..sz]);
            self.data = grown;
        } else if excited {
            self.data.copy_within(0..sz, sz);
            self.data[..sz].fill(0.0);
            self.data[2 * sz..4 * sz].fill(0.0);
        } else {
            self.data[sz..4 * sz].fill(0.0);
        }
        self.num_qubits += 1;
        self.alloc_qubits = self.alloc_qubits.max(self.num_qubits);
        Ok(())
    }

    /// Project a qubit onto a measurement outcome and remove it, leaving
    /// the state unnormalized.
    ///
    /// The qubit is first swapped with the highest slot, so after removal
    /// the formerly-highest qubit occupies slot `bit`; callers tracking
    /// qubit identities must account for this relabeling.
    pub fn project_measurement(&mut self, bit: usize, excited: bool)
        -> Result<()>
    {
        self.check_bit(bit)?;
        let last = self.num_qubits - 1;
        if bit != last {
            self.swap_digits(bit, last);
        }
        let sz = 1 << (2 * last);
        if excited {
            self.data.copy_within(sz..2 * sz, 0);
        }
        self.num_qubits = last;
        Ok(())
    }

    fn swap_digits(&mut self, bit_a: usize, bit_b: usize) {
        let s_a = 1 << (2 * bit_a);
        let s_b = 1 << (2 * bit_b);
        let size = 1 << (2 * self.num_qubits);
        for idx in 0..size {
            let d_a = (idx / s_a) % 4;
            let d_b = (idx / s_b) % 4;
            let swapped = idx - d_a * s_a - d_b * s_b + d_b * s_a + d_a * s_b;
            if swapped > idx {
                self.data.swap(idx, swapped);
            }
        }
    }

    fn check_bit(&self, bit: usize) -> Result<()> {
        if bit >= self.num_qubits {
            return Err(Error::IndexOutOfRange {
                index: bit,
                len: self.num_qubits,
            });
        }
        Ok(())
    }

    fn cached_kernel(&mut self, ptm: &nd::Array2<f64>, side: usize)
        -> Result<Arc<Vec<f64>>>
    {
        if ptm.shape() != [side, side] {
            return Err(Error::Shape {
                expected: vec![side, side],
                got: ptm.shape().to_vec(),
            });
        }
        let key: Vec<u64> = ptm.iter().map(|x| x.to_bits()).collect();
        if let Some(hit) = self.ptm_cache.get(&key) {
            return Ok(Arc::clone(hit));
        }
        let flat = Arc::new(ptm.iter().copied().collect::<Vec<f64>>());
        self.ptm_cache.insert(key, Arc::clone(&flat));
        Ok(flat)
    }
}

/// Flat Pauli-vector index of the diagonal entry for the computational
/// state `m`: each qubit's population digit equals its bit of `m`.
fn diag_index(m: usize, num_qubits: usize) -> usize {
    (0..num_qubits).map(|i| ((m >> i) & 1) << (2 * i)).sum()
}

fn apply_single(data: &mut [f64], bit: usize, ptm: &[f64]) {
    let stride = 1 << (2 * bit);
    let fibers = data.len() / 4;
    let mut fiber = [0.0_f64; 4];
    for r in 0..fibers {
        let low = r % stride;
        let high = r / stride;
        let base = low + high * 4 * stride;
        for (e, f) in fiber.iter_mut().enumerate() {
            *f = data[base + e * stride];
        }
        for d in 0..4 {
            let mut acc = 0.0;
            for (e, f) in fiber.iter().enumerate() {
                acc += ptm[4 * d + e] * *f;
            }
            data[base + d * stride] = acc;
        }
    }
}

fn check_capacity(num_qubits: usize) -> Result<()> {
    if num_qubits > MAX_QUBITS {
        return Err(Error::CapacityExceeded {
            qubits: num_qubits,
            max: MAX_QUBITS,
        });
    }
    Ok(())
}

fn check_diag_capacity(num_qubits: usize) -> Result<()> {
    if num_qubits > MAX_DIAG_QUBITS {
        return Err(Error::CapacityExceeded {
            qubits: num_qubits,
            max: MAX_DIAG_QUBITS,
        });
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use std::f64::consts::PI;
    use crate::qubits;

    const TOL: f64 = 1e-9;

    fn close(a: f64, b: f64) -> bool { (a - b).abs() < TOL }

    fn assert_diag(state: &State, expected: &[f64]) {
        let diag = state.get_diag().unwrap();
        assert_eq!(diag.len(), expected.len());
        for (a, b) in diag.iter().zip(expected) {
            assert!(close(*a, *b), "{:?} vs {:?}", diag, expected);
        }
    }

    #[test]
    fn ground_state() {
        let state = State::new(2).unwrap();
        assert_eq!(state.num_qubits(), 2);
        assert_diag(&state, &[1.0, 0.0, 0.0, 0.0]);
        assert!(close(state.trace().unwrap(), 1.0));
    }

    #[test]
    fn capacity_limits() {
        assert!(matches!(
            State::new(MAX_QUBITS + 1),
            Err(Error::CapacityExceeded { .. }),
        ));
        let state = State::new(MAX_DIAG_QUBITS + 1).unwrap();
        assert!(matches!(
            state.trace(),
            Err(Error::CapacityExceeded { .. }),
        ));
    }

    #[test]
    fn from_pv_validates_length() {
        assert!(matches!(
            State::from_pv(2, vec![0.0; 15]),
            Err(Error::Shape { .. }),
        ));
    }

    #[test]
    fn flip_one_qubit() {
        let mut state = State::new(2).unwrap();
        state.apply(&qubits::rotate_x(PI)).unwrap();
        assert_diag(&state, &[0.0, 1.0, 0.0, 0.0]);
        let (p0, p1) = state.partial_trace(0).unwrap();
        assert!(close(p0, 0.0));
        assert!(close(p1, 1.0));
        let (p0, p1) = state.partial_trace(1).unwrap();
        assert!(close(p0, 1.0));
        assert!(close(p1, 0.0));
    }

    #[test]
    fn full_rotation_is_identity() {
        let mut state = State::new(1).unwrap();
        state.apply(&qubits::rotate_y(0.7)).unwrap();
        let before = state.pv().to_vec();
        state.apply(&qubits::rotate_x(2.0 * PI)).unwrap();
        for (a, b) in state.pv().iter().zip(&before) {
            assert!(close(*a, *b));
        }
    }

    #[test]
    fn hadamard_splits_populations() {
        let mut state = State::new(1).unwrap();
        state.apply(&qubits::hadamard()).unwrap();
        assert!(close(state.trace().unwrap(), 1.0));
        let (p0, p1) = state.partial_trace(0).unwrap();
        assert!(close(p0, 0.5));
        assert!(close(p1, 0.5));
    }

    #[test]
    fn cnot_propagates_excitation() {
        let mut state = State::new(2).unwrap();
        state.apply(&qubits::rotate_x(PI)).unwrap();
        state.apply(&qubits::cnot().at(&[0, 1]).unwrap()).unwrap();
        // both qubits excited: diagonal index 0b11
        assert_diag(&state, &[0.0, 0.0, 0.0, 1.0]);
        // a second cnot with swapped roles resets the control
        state.apply(&qubits::cnot().at(&[1, 0]).unwrap()).unwrap();
        assert_diag(&state, &[0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn kernels_agree() {
        let ops = [
            qubits::rotate_x(0.4).at(&[0]).unwrap(),
            qubits::cnot().at(&[0, 2]).unwrap(),
            qubits::rotate_y(1.1).at(&[2]).unwrap(),
            qubits::iswap(PI / 2.0).at(&[2, 1]).unwrap(),
            qubits::cphase(0.8).at(&[1, 0]).unwrap(),
        ];
        let mut direct
            = State::with_kernel(3, Arc::new(DirectKernel)).unwrap();
        let mut general
            = State::with_kernel(3, Arc::new(GeneralKernel)).unwrap();
        for op in &ops {
            direct.apply(op).unwrap();
            general.apply(op).unwrap();
        }
        for (a, b) in direct.pv().iter().zip(general.pv()) {
            assert!(close(*a, *b));
        }
    }

    #[test]
    fn dense_round_trip() {
        let mut state = State::new(2).unwrap();
        state.apply(&qubits::hadamard()).unwrap();
        state.apply(&qubits::cnot().at(&[0, 1]).unwrap()).unwrap();
        let dm = state.to_array().unwrap();
        let back = State::from_dense(2, &dm).unwrap();
        for (a, b) in state.pv().iter().zip(back.pv()) {
            assert!(close(*a, *b));
        }
        // Bell state: maximal populations and coherence between ∣00⟩, ∣11⟩
        assert!(close(dm[[0, 0]].re, 0.5));
        assert!(close(dm[[3, 3]].re, 0.5));
        assert!(close(dm[[0, 3]].re, 0.5));
        assert!(close(dm[[1, 1]].re, 0.0));
    }

    #[test]
    fn from_dense_validates_shape() {
        let dm: nd::Array2<C64> = nd::Array2::eye(3);
        assert!(matches!(
            State::from_dense(2, &dm),
            Err(Error::Shape { .. }),
        ));
    }

    #[test]
    fn apply_rejects_oversized_and_qutrit_ops() {
        let mut state = State::new(3).unwrap();
        let three = Operation::from_sequence(&[
            qubits::cnot().at(&[0, 1]).unwrap(),
            qubits::cnot().at(&[1, 2]).unwrap(),
        ]).unwrap();
        assert!(matches!(
            state.apply(&three),
            Err(Error::DimensionMismatch { expected: 2, got: 3 }),
        ));
        let qutrit = Operation::from_unitary(
            nd::Array2::eye(3),
            &[crate::bases::general(3).unwrap()],
        ).unwrap();
        assert!(matches!(
            state.apply(&qutrit),
            Err(Error::DimensionMismatch { .. }),
        ));
    }

    #[test]
    fn apply_validates_bit_range() {
        let mut state = State::new(1).unwrap();
        assert!(matches!(
            state.apply(&qubits::rotate_x(0.1).at(&[1]).unwrap()),
            Err(Error::IndexOutOfRange { index: 1, len: 1 }),
        ));
    }

    #[test]
    fn renormalize_restores_trace() {
        let mut state = State::from_pv(
            1, vec![0.25, 0.25, 0.0, 0.0],
        ).unwrap();
        let prior = state.renormalize().unwrap();
        assert!(close(prior, 0.5));
        assert!(close(state.trace().unwrap(), 1.0));
    }

    #[test]
    fn ancilla_round_trip() {
        let mut state = State::new(1).unwrap();
        state.apply(&qubits::rotate_y(0.9)).unwrap();
        let before = state.pv().to_vec();
        state.add_ancilla(true).unwrap();
        assert_eq!(state.num_qubits(), 2);
        let (p0, p1) = state.partial_trace(1).unwrap();
        assert!(close(p0, 0.0));
        assert!(close(p1, 1.0));
        state.project_measurement(1, true).unwrap();
        assert_eq!(state.num_qubits(), 1);
        for (a, b) in state.pv().iter().zip(&before) {
            assert!(close(*a, *b));
        }
    }

    #[test]
    fn ancilla_storage_reuse() {
        let mut state = State::new(1).unwrap();
        for _ in 0..3 {
            state.add_ancilla(false).unwrap();
            state.project_measurement(1, false).unwrap();
        }
        state.add_ancilla(true).unwrap();
        let (p0, p1) = state.partial_trace(1).unwrap();
        assert!(close(p0, 0.0));
        assert!(close(p1, 1.0));
        assert!(close(state.trace().unwrap(), 1.0));
    }

    #[test]
    fn projection_matches_partial_trace() {
        let mut state = State::new(2).unwrap();
        state.apply(&qubits::rotate_y(0.6)).unwrap();
        state.apply(&qubits::cnot().at(&[0, 1]).unwrap()).unwrap();
        state.apply(&qubits::amp_damping(0.3).at(&[1]).unwrap()).unwrap();
        let (_, p1) = state.partial_trace(1).unwrap();
        let mut projected = state.clone();
        projected.project_measurement(1, true).unwrap();
        assert!(close(projected.trace().unwrap(), p1));
    }

    #[test]
    fn projection_swaps_highest_qubit_down() {
        let mut state = State::new(3).unwrap();
        // excite qubit 2, then project qubit 0 in the ground outcome
        state.apply(&qubits::rotate_x(PI).at(&[2]).unwrap()).unwrap();
        state.project_measurement(0, false).unwrap();
        assert_eq!(state.num_qubits(), 2);
        // the former qubit 2 now occupies slot 0
        let (p0, p1) = state.partial_trace(0).unwrap();
        assert!(close(p0, 0.0));
        assert!(close(p1, 1.0));
    }

    #[test]
    fn two_ptm_direct_call() {
        let mut state = State::new(2).unwrap();
        state.apply(&qubits::rotate_x(PI)).unwrap();
        let b: Vec<Arc<PauliBasis>>
            = vec![bases::cached(Kind::General, 2); 2];
        let ptm = qubits::cnot().ptm(&b, &b).unwrap();
        let flat = ptm.view().into_shape((16, 16)).unwrap().to_owned();
        state.apply_two_ptm(0, 1, &flat).unwrap();
        assert_diag(&state, &[0.0, 0.0, 0.0, 1.0]);
        // repeated application hits the kernel cache
        state.apply_two_ptm(0, 1, &flat).unwrap();
        assert_diag(&state, &[0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn ptm_shape_validation() {
        let mut state = State::new(2).unwrap();
        let bad: nd::Array2<f64> = nd::Array2::eye(5);
        assert!(matches!(
            state.apply_ptm(0, &bad),
            Err(Error::Shape { .. }),
        ));
        assert!(matches!(
            state.apply_two_ptm(0, 1, &bad),
            Err(Error::Shape { .. }),
        ));
    }
}
