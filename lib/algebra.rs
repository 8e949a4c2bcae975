//! Conversions between the Kraus (operator-sum) and Pauli-transfer-matrix
//! representations of quantum channels, and between density matrices and
//! their Pauli-vector expansions.
//!
//! All functions take per-subsystem basis tuples as slices. The multi-index
//! convention throughout is that subsystem 0 is the most significant factor:
//! it is the high-order factor of every Kronecker product and axis 0 of every
//! C-order tensor, so flattened indices agree with the kron'd matrices.

use std::sync::Arc;
use itertools::Itertools;
use ndarray::{ self as nd, linalg::kron };
use num_complex::Complex64 as C64;
use crate::{
    bases::PauliBasis,
    error::{ Error, Result },
};

/// Tr(*A*·*B*) without materializing the product.
pub(crate) fn trace_prod(a: &nd::Array2<C64>, b: &nd::Array2<C64>) -> C64 {
    a.outer_iter().zip(b.axis_iter(nd::Axis(1)))
        .map(|(row, col)| {
            row.iter().zip(col.iter()).map(|(x, y)| x * y).sum::<C64>()
        })
        .sum()
}

/// Kronecker products of all element combinations of a basis tuple, with
/// subsystem 0 as the most significant factor; the result is indexed by the
/// C-order flattening of the per-subsystem element multi-index.
pub(crate) fn bases_kron(bases: &[Arc<PauliBasis>]) -> Vec<nd::Array2<C64>> {
    let mut acc: Vec<nd::Array2<C64>> = bases[0].vectors().to_vec();
    for b in bases[1..].iter() {
        acc = acc.iter().cartesian_product(b.vectors().iter())
            .map(|(l, r)| kron(l, r))
            .collect();
    }
    acc
}

pub(crate) fn check_tuples(
    bases_in: &[Arc<PauliBasis>],
    bases_out: &[Arc<PauliBasis>],
) -> Result<()> {
    if bases_in.len() != bases_out.len() {
        return Err(Error::DimensionMismatch {
            expected: bases_in.len(),
            got: bases_out.len(),
        });
    }
    if bases_in.is_empty() {
        return Err(Error::DimensionMismatch { expected: 1, got: 0 });
    }
    for (bi, bo) in bases_in.iter().zip(bases_out) {
        if bi.dim_hilbert() != bo.dim_hilbert() {
            return Err(Error::DimensionMismatch {
                expected: bi.dim_hilbert(),
                got: bo.dim_hilbert(),
            });
        }
    }
    Ok(())
}

pub(crate) fn pauli_shape(
    bases_out: &[Arc<PauliBasis>],
    bases_in: &[Arc<PauliBasis>],
) -> Vec<usize> {
    bases_out.iter().chain(bases_in).map(|b| b.dim_pauli()).collect()
}

/// Convert a stack of Kraus operators acting on the tensor-product Hilbert
/// space of `n` subsystems into the real PTM tensor of shape
/// `(out_1, …, out_n, in_1, …, in_n)` via
/// PTM[x, y] = Σ<sub>z</sub> Tr(B<sub>out</sub>[x] K<sub>z</sub>
/// B<sub>in</sub>[y] K<sub>z</sub><sup>†</sup>).
///
/// Imaginary parts of the contraction are round-off artifacts and are
/// discarded.
pub fn kraus_to_ptm(
    kraus: &nd::Array3<C64>,
    bases_in: &[Arc<PauliBasis>],
    bases_out: &[Arc<PauliBasis>],
) -> Result<nd::ArrayD<f64>> {
    check_tuples(bases_in, bases_out)?;
    let dim: usize = bases_in.iter().map(|b| b.dim_hilbert()).product();
    let kshape = kraus.shape();
    if kshape[1] != dim || kshape[2] != dim {
        return Err(Error::Shape {
            expected: vec![kshape[0], dim, dim],
            got: kshape.to_vec(),
        });
    }
    let bout = bases_kron(bases_out);
    let bin_ = bases_kron(bases_in);
    let mut flat: nd::Array2<f64> = nd::Array2::zeros((bout.len(), bin_.len()));
    for k in kraus.outer_iter() {
        let k = k.to_owned();
        let kdag = k.t().mapv(|z| z.conj());
        let left: Vec<nd::Array2<C64>> =
            bout.iter().map(|b| b.dot(&k)).collect();
        let right: Vec<nd::Array2<C64>> =
            bin_.iter().map(|b| b.dot(&kdag)).collect();
        for (x, l) in left.iter().enumerate() {
            for (y, r) in right.iter().enumerate() {
                flat[[x, y]] += trace_prod(l, r).re;
            }
        }
    }
    let shape = pauli_shape(bases_out, bases_in);
    reshape_dyn(flat, &shape)
}

/// Re-express a PTM given in one basis pair in another basis pair via the
/// double basis change S<sub>out</sub> · P · S<sub>in</sub><sup>T</sup>,
/// where S[x<sub>new</sub>, x<sub>old</sub>] =
/// Tr(B<sub>new</sub>[x<sub>new</sub>] B<sub>old</sub>[x<sub>old</sub>]).
///
/// When a new basis does not span all of an old one, the result is the
/// orthogonal projection onto the new basis; information in the discarded
/// directions is lost.
pub fn ptm_convert_basis(
    ptm: &nd::ArrayD<f64>,
    bases_in_old: &[Arc<PauliBasis>],
    bases_out_old: &[Arc<PauliBasis>],
    bases_in_new: &[Arc<PauliBasis>],
    bases_out_new: &[Arc<PauliBasis>],
) -> Result<nd::ArrayD<f64>> {
    check_tuples(bases_in_old, bases_out_old)?;
    check_tuples(bases_in_new, bases_out_new)?;
    check_tuples(bases_in_old, bases_in_new)?;
    check_tuples(bases_out_old, bases_out_new)?;
    let old_shape = pauli_shape(bases_out_old, bases_in_old);
    if ptm.shape() != old_shape.as_slice() {
        return Err(Error::Shape {
            expected: old_shape,
            got: ptm.shape().to_vec(),
        });
    }
    let s_out = overlap_matrix(bases_out_new, bases_out_old);
    let s_in = overlap_matrix(bases_in_new, bases_in_old);
    let d_out: usize = bases_out_old.iter().map(|b| b.dim_pauli()).product();
    let d_in: usize = bases_in_old.iter().map(|b| b.dim_pauli()).product();
    let flat = reshape_two(ptm.clone(), d_out, d_in)?;
    let converted = s_out.dot(&flat).dot(&s_in.t());
    let shape = pauli_shape(bases_out_new, bases_in_new);
    reshape_dyn(converted, &shape)
}

/// Overlap matrix S[x_new, x_old] = Tr(B_new[x_new] B_old[x_old]); real for
/// Hermitian bases.
fn overlap_matrix(
    bases_new: &[Arc<PauliBasis>],
    bases_old: &[Arc<PauliBasis>],
) -> nd::Array2<f64> {
    let new_k = bases_kron(bases_new);
    let old_k = bases_kron(bases_old);
    let mut s: nd::Array2<f64> = nd::Array2::zeros((new_k.len(), old_k.len()));
    for (x, bn) in new_k.iter().enumerate() {
        for (y, bo) in old_k.iter().enumerate() {
            s[[x, y]] = trace_prod(bn, bo).re;
        }
    }
    s
}

/// Expand a dense density matrix into its real Pauli-vector coefficients
/// over the given bases.
pub fn dm_to_pv(
    dm: &nd::Array2<C64>,
    bases: &[Arc<PauliBasis>],
) -> Result<nd::ArrayD<f64>> {
    let dim: usize = bases.iter().map(|b| b.dim_hilbert()).product();
    if dm.shape() != [dim, dim] {
        return Err(Error::Shape {
            expected: vec![dim, dim],
            got: dm.shape().to_vec(),
        });
    }
    let bk = bases_kron(bases);
    let pv: Vec<f64> = bk.iter().map(|b| trace_prod(b, dm).re).collect();
    let shape: Vec<usize> = bases.iter().map(|b| b.dim_pauli()).collect();
    reshape_dyn(nd::Array1::from_vec(pv), &shape)
}

/// Reconstruct the dense density matrix from its Pauli-vector coefficients
/// over the given bases.
pub fn pv_to_dm(
    pv: &nd::ArrayD<f64>,
    bases: &[Arc<PauliBasis>],
) -> Result<nd::Array2<C64>> {
    let shape: Vec<usize> = bases.iter().map(|b| b.dim_pauli()).collect();
    if pv.shape() != shape.as_slice() {
        return Err(Error::Shape { expected: shape, got: pv.shape().to_vec() });
    }
    let dim: usize = bases.iter().map(|b| b.dim_hilbert()).product();
    let bk = bases_kron(bases);
    let mut dm: nd::Array2<C64> = nd::Array2::zeros((dim, dim));
    for (c, b) in pv.iter().zip(bk.iter()) {
        dm = dm + b * C64::from(*c);
    }
    Ok(dm)
}

fn reshape_dyn<D>(arr: nd::Array<f64, D>, shape: &[usize])
    -> Result<nd::ArrayD<f64>>
where D: nd::Dimension
{
    arr.into_shape(nd::IxDyn(shape))
        .map_err(|_| Error::Shape { expected: shape.to_vec(), got: Vec::new() })
}

fn reshape_two(arr: nd::ArrayD<f64>, rows: usize, cols: usize)
    -> Result<nd::Array2<f64>>
{
    arr.into_shape((rows, cols))
        .map_err(|_| Error::Shape {
            expected: vec![rows, cols],
            got: Vec::new(),
        })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bases;

    const TOL: f64 = 1e-10;

    fn amp_damping_kraus(p: f64) -> nd::Array3<C64> {
        let mut k: nd::Array3<C64> = nd::Array3::zeros((2, 2, 2));
        k[[0, 0, 0]] = 1.0.into();
        k[[0, 1, 1]] = (1.0 - p).sqrt().into();
        k[[1, 0, 1]] = p.sqrt().into();
        k
    }

    #[test]
    fn amp_damping_ptm_gell_mann() {
        let p = 0.5;
        let gm = vec![bases::gell_mann(2).unwrap()];
        let ptm = kraus_to_ptm(&amp_damping_kraus(p), &gm, &gm).unwrap();
        assert_eq!(ptm.shape(), [4, 4]);
        let s = (1.0 - p).sqrt();
        let expected = nd::array![
            [1.0, 0.0, 0.0, 0.0],
            [0.0, s,   0.0, 0.0],
            [0.0, 0.0, s,   0.0],
            [p,   0.0, 0.0, 1.0 - p],
        ];
        for (a, b) in ptm.iter().zip(expected.iter()) {
            assert!((a - b).abs() < TOL, "{} != {}", a, b);
        }
    }

    #[test]
    fn cz_ptm_general_basis() {
        let mut cz: nd::Array3<C64> = nd::Array3::zeros((1, 4, 4));
        cz[[0, 0, 0]] = 1.0.into();
        cz[[0, 1, 1]] = 1.0.into();
        cz[[0, 2, 2]] = 1.0.into();
        cz[[0, 3, 3]] = (-1.0).into();
        let gm: Vec<_> = vec![bases::gell_mann(2).unwrap(); 2];
        let ptm = kraus_to_ptm(&cz, &gm, &gm).unwrap();
        assert_eq!(ptm.shape(), [4, 4, 4, 4]);
        assert!(ptm.iter().all(|p| (-1.0 - TOL..=1.0 + TOL).contains(p)));
        let flat = ptm.into_shape((16, 16)).unwrap();
        // unitary and unital: first row and column are (1, 0, ..., 0)
        assert!((flat.row(0).sum() - 1.0).abs() < TOL);
        assert!((flat.column(0).sum() - 1.0).abs() < TOL);
    }

    #[test]
    fn cz_ptm_qutrits() {
        let phases = [1.0, 1.0, 1.0, 1.0, -1.0, 1.0, -1.0, 1.0, 1.0];
        let mut cz: nd::Array3<C64> = nd::Array3::zeros((1, 9, 9));
        for (i, ph) in phases.iter().enumerate() {
            cz[[0, i, i]] = (*ph).into();
        }
        let gm: Vec<_> = vec![bases::gell_mann(3).unwrap(); 2];
        let ptm = kraus_to_ptm(&cz, &gm, &gm).unwrap();
        assert_eq!(ptm.shape(), [9, 9, 9, 9]);
        assert!(ptm.iter().all(|p| (-1.0 - TOL..=1.0 + TOL).contains(p)));
        let flat = ptm.into_shape((81, 81)).unwrap();
        assert!((flat.row(0).sum() - 1.0).abs() < TOL);
        assert!((flat.column(0).sum() - 1.0).abs() < TOL);
    }

    #[test]
    fn kraus_shape_errors() {
        let gm3 = vec![bases::gell_mann(3).unwrap()];
        let kraus = amp_damping_kraus(0.5);
        assert!(matches!(
            kraus_to_ptm(&kraus, &gm3, &gm3),
            Err(Error::Shape { .. }),
        ));
        let gm2 = vec![bases::gell_mann(2).unwrap()];
        assert!(matches!(
            kraus_to_ptm(&kraus, &gm2, &[]),
            Err(Error::DimensionMismatch { .. }),
        ));
    }

    #[test]
    fn identity_conversion_is_noop() {
        let gm = vec![bases::gell_mann(2).unwrap()];
        let ptm = kraus_to_ptm(&amp_damping_kraus(0.3), &gm, &gm).unwrap();
        let conv = ptm_convert_basis(&ptm, &gm, &gm, &gm, &gm).unwrap();
        for (a, b) in conv.iter().zip(ptm.iter()) {
            assert!((a - b).abs() < TOL);
        }
    }

    #[test]
    fn gell_mann_to_general_consistent() {
        let gm = vec![bases::gell_mann(2).unwrap()];
        let gen = vec![bases::general(2).unwrap()];
        let kraus = amp_damping_kraus(0.5);
        let direct = kraus_to_ptm(&kraus, &gen, &gen).unwrap();
        let via_gm = kraus_to_ptm(&kraus, &gm, &gm).unwrap();
        let converted = ptm_convert_basis(&via_gm, &gm, &gm, &gen, &gen)
            .unwrap();
        for (a, b) in converted.iter().zip(direct.iter()) {
            assert!((a - b).abs() < TOL);
        }
    }

    #[test]
    fn dm_pv_round_trip() {
        let gen = vec![bases::general(2).unwrap(); 2];
        // ∣+0⟩⟨+0∣
        let mut dm: nd::Array2<C64> = nd::Array2::zeros((4, 4));
        dm[[0, 0]] = 0.5.into();
        dm[[0, 2]] = 0.5.into();
        dm[[2, 0]] = 0.5.into();
        dm[[2, 2]] = 0.5.into();
        let pv = dm_to_pv(&dm, &gen).unwrap();
        assert_eq!(pv.shape(), [4, 4]);
        let back = pv_to_dm(&pv, &gen).unwrap();
        for (a, b) in back.iter().zip(dm.iter()) {
            assert!((a - b).norm() < TOL);
        }
    }

    #[test]
    fn random_conversion_round_trips() {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let gen = vec![bases::general(2).unwrap()];
        let gm = vec![bases::gell_mann(2).unwrap()];
        // basis change between two full bases is orthogonal, so any tensor
        // round-trips, not just physical channels
        for _ in 0..10 {
            let ptm: nd::ArrayD<f64> = nd::ArrayD::from_shape_fn(
                nd::IxDyn(&[4, 4]),
                |_| rng.gen_range(-1.0..1.0),
            );
            let there = ptm_convert_basis(&ptm, &gen, &gen, &gm, &gm)
                .unwrap();
            let back = ptm_convert_basis(&there, &gm, &gm, &gen, &gen)
                .unwrap();
            for (a, b) in back.iter().zip(ptm.iter()) {
                assert!((a - b).abs() < TOL);
            }
        }
    }
}
