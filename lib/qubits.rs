//! Curated library of qubit gates and noise channels.
//!
//! Every function here returns a plain [`Operation`] acting on one or two
//! qubits in the full general basis (the damping channels with explicit
//! per-axis rates are stored directly as Gell-Mann PTMs). Shapes are fixed
//! at compile time, so construction cannot fail except where a caller
//! supplies a matrix of their own ([`controlled_unitary`]).
//!
//! Apply these to a [`State`](crate::state::State) through its generic
//! `apply` path, reindexing with [`Operation::at`] as needed.

use std::f64::consts::SQRT_2;
use ndarray as nd;
use num_complex::Complex64 as C64;
use crate::{
    bases::{ self, Kind, PauliBasis },
    error::{ Error, Result },
    operation::Operation,
};
use std::sync::Arc;

fn qubit_bases1() -> [Arc<PauliBasis>; 1] {
    [bases::cached(Kind::General, 2)]
}

fn qubit_bases2() -> [Arc<PauliBasis>; 2] {
    let b = bases::cached(Kind::General, 2);
    [b.clone(), b]
}

fn gell_mann1() -> [Arc<PauliBasis>; 1] {
    [bases::cached(Kind::GellMann, 2)]
}

fn zero() -> C64 { C64::new(0.0, 0.0) }

fn one() -> C64 { C64::new(1.0, 0.0) }

fn re(x: f64) -> C64 { C64::new(x, 0.0) }

/// A perfect single-qubit rotation described by three Euler angles,
///
/// <blockquote>
///   U = R<sub>Z</sub>(φ) · R<sub>X</sub>(θ) · R<sub>Z</sub>(λ)
/// </blockquote>
///
/// with all angles in radians.
pub fn rotate_euler(phi: f64, theta: f64, lamda: f64) -> Operation {
    let exp_phi = C64::from_polar(1.0, phi);
    let exp_lamda = C64::from_polar(1.0, lamda);
    let (sin, cos) = (theta / 2.0).sin_cos();
    let matrix: nd::Array2<C64> = nd::array![
        [re(cos),                -C64::i() * exp_lamda * sin],
        [-C64::i() * exp_phi * sin, exp_phi * exp_lamda * cos],
    ];
    Operation::from_kraus_unchecked(
        matrix.insert_axis(nd::Axis(0)), &qubit_bases1())
}

/// A perfect single-qubit rotation by `angle` radians around the *x* axis.
pub fn rotate_x(angle: f64) -> Operation {
    let (sin, cos) = (angle / 2.0).sin_cos();
    let matrix: nd::Array2<C64> = nd::array![
        [re(cos),        -C64::i() * sin],
        [-C64::i() * sin, re(cos)       ],
    ];
    Operation::from_kraus_unchecked(
        matrix.insert_axis(nd::Axis(0)), &qubit_bases1())
}

/// A perfect single-qubit rotation by `angle` radians around the *y* axis.
pub fn rotate_y(angle: f64) -> Operation {
    let (sin, cos) = (angle / 2.0).sin_cos();
    let matrix: nd::Array2<C64> = nd::array![
        [re(cos), re(-sin)],
        [re(sin), re(cos) ],
    ];
    Operation::from_kraus_unchecked(
        matrix.insert_axis(nd::Axis(0)), &qubit_bases1())
}

/// A perfect single-qubit rotation by `angle` radians around the *z* axis.
pub fn rotate_z(angle: f64) -> Operation {
    let exp = C64::from_polar(1.0, -angle / 2.0);
    let matrix: nd::Array2<C64> = nd::array![
        [exp,    zero()    ],
        [zero(), exp.conj()],
    ];
    Operation::from_kraus_unchecked(
        matrix.insert_axis(nd::Axis(0)), &qubit_bases1())
}

/// Phase rotation of the ∣1⟩ state by `angle` radians.
pub fn phase_shift(angle: f64) -> Operation {
    let matrix: nd::Array2<C64> = nd::array![
        [one(),  zero()                   ],
        [zero(), C64::from_polar(1.0, angle)],
    ];
    Operation::from_kraus_unchecked(
        matrix.insert_axis(nd::Axis(0)), &qubit_bases1())
}

/// A perfect Hadamard gate.
pub fn hadamard() -> Operation {
    let h = 1.0 / SQRT_2;
    let matrix: nd::Array2<C64> = nd::array![
        [re(h), re(h) ],
        [re(h), re(-h)],
    ];
    Operation::from_kraus_unchecked(
        matrix.insert_axis(nd::Axis(0)), &qubit_bases1())
}

/// A perfect controlled phase rotation of the ∣11⟩ state by `angle`
/// radians.
pub fn cphase(angle: f64) -> Operation {
    let mut matrix: nd::Array2<C64> = nd::Array2::eye(4);
    matrix[[3, 3]] = C64::from_polar(1.0, angle);
    Operation::from_kraus_unchecked(
        matrix.insert_axis(nd::Axis(0)), &qubit_bases2())
}

/// A perfect controlled-NOT gate; the first subsystem is the control.
pub fn cnot() -> Operation {
    let matrix: nd::Array2<C64> = nd::array![
        [one(),  zero(), zero(), zero()],
        [zero(), one(),  zero(), zero()],
        [zero(), zero(), zero(), one() ],
        [zero(), zero(), one(),  zero()],
    ];
    Operation::from_kraus_unchecked(
        matrix.insert_axis(nd::Axis(0)), &qubit_bases2())
}

/// A perfect iSWAP interaction for `angle` radians; `angle = π/2` gives the
/// full iSWAP gate.
pub fn iswap(angle: f64) -> Operation {
    let (sin, cos) = angle.sin_cos();
    let matrix: nd::Array2<C64> = nd::array![
        [one(),  zero(),          zero(),          zero()],
        [zero(), re(cos),         C64::i() * sin,  zero()],
        [zero(), C64::i() * sin,  re(cos),         zero()],
        [zero(), zero(),          zero(),          one() ],
    ];
    Operation::from_kraus_unchecked(
        matrix.insert_axis(nd::Axis(0)), &qubit_bases2())
}

/// A unitary on a target subsystem of any Hilbert dimension, applied
/// conditionally on a qubit control.
///
/// Fails with [`Error::Shape`] if `unitary` is not square.
pub fn controlled_unitary(unitary: nd::Array2<C64>) -> Result<Operation> {
    let d = unitary.nrows();
    if unitary.ncols() != d {
        return Err(Error::Shape {
            expected: vec![d, d],
            got: unitary.shape().to_vec(),
        });
    }
    let target = bases::general(d)?;
    let control = bases::cached(Kind::General, 2);
    let mut matrix: nd::Array2<C64> = nd::Array2::eye(2 * d);
    matrix.slice_mut(nd::s![d.., d..]).assign(&unitary);
    Ok(Operation::from_kraus_unchecked(
        matrix.insert_axis(nd::Axis(0)), &[control, target]))
}

/// Rotation axes for [`controlled_rotation`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Axis { X, Y, Z }

/// A qubit rotation by `angle` radians around `axis`, applied conditionally
/// on a qubit control.
pub fn controlled_rotation(angle: f64, axis: Axis) -> Operation {
    let (sin, cos) = (angle / 2.0).sin_cos();
    let block: nd::Array2<C64> = match axis {
        Axis::X => nd::array![
            [re(cos),        -C64::i() * sin],
            [-C64::i() * sin, re(cos)       ],
        ],
        Axis::Y => nd::array![
            [re(cos), re(-sin)],
            [re(sin), re(cos) ],
        ],
        Axis::Z => {
            let exp = C64::from_polar(1.0, -angle / 2.0);
            nd::array![
                [exp,    zero()    ],
                [zero(), exp.conj()],
            ]
        },
    };
    let mut matrix: nd::Array2<C64> = nd::Array2::eye(4);
    matrix.slice_mut(nd::s![2.., 2..]).assign(&block);
    Operation::from_kraus_unchecked(
        matrix.insert_axis(nd::Axis(0)), &qubit_bases2())
}

/// Amplitude damping toward ∣0⟩ with excitation-loss probability
/// `total_rate`.
pub fn amp_damping(total_rate: f64) -> Operation {
    let keep = (1.0 - total_rate).sqrt();
    let lose = total_rate.sqrt();
    let kraus: nd::Array3<C64> = nd::array![
        [[one(),  zero()  ],
         [zero(), re(keep)]],
        [[zero(), re(lose)],
         [zero(), zero()  ]],
    ];
    Operation::from_kraus_unchecked(kraus, &qubit_bases1())
}

/// Generalized amplitude damping with independent excitation and relaxation
/// rates, stored as a Gell-Mann PTM.
pub fn amp_damping_with_rates(exc_rate: f64, damp_rate: f64) -> Operation {
    let comb = exc_rate + damp_rate;
    let coh = (1.0 - comb).sqrt();
    let ptm: nd::Array2<f64> = nd::array![
        [1.0,                    0.0, 0.0, 0.0       ],
        [0.0,                    coh, 0.0, 0.0       ],
        [0.0,                    0.0, coh, 0.0       ],
        [2.0 * damp_rate - comb, 0.0, 0.0, 1.0 - comb],
    ];
    let gm = gell_mann1();
    Operation::from_ptm_unchecked(ptm.into_dyn(), &gm, &gm)
}

/// Pure dephasing with probability `total_rate`.
pub fn phase_damping(total_rate: f64) -> Operation {
    let keep = (1.0 - total_rate).sqrt();
    let deph = total_rate.sqrt();
    let kraus: nd::Array3<C64> = nd::array![
        [[one(),  zero()  ],
         [zero(), re(keep)]],
        [[zero(), zero()  ],
         [zero(), re(deph)]],
    ];
    Operation::from_kraus_unchecked(kraus, &qubit_bases1())
}

/// Dephasing with an independent rate along each Bloch axis, stored as a
/// Gell-Mann PTM.
pub fn phase_damping_with_rates(
    x_deph_rate: f64,
    y_deph_rate: f64,
    z_deph_rate: f64,
) -> Operation {
    let ptm = nd::Array2::from_diag(&nd::array![
        1.0,
        1.0 - x_deph_rate,
        1.0 - y_deph_rate,
        1.0 - z_deph_rate,
    ]);
    let gm = gell_mann1();
    Operation::from_ptm_unchecked(ptm.into_dyn(), &gm, &gm)
}

/// Combined amplitude and phase damping.
///
/// Equal to amplitude damping at `damp_rate` followed by pure dephasing at
/// `deph_rate`; the product collapses to a single Gell-Mann PTM.
pub fn amp_phase_damping(damp_rate: f64, deph_rate: f64) -> Operation {
    let coh = ((1.0 - damp_rate) * (1.0 - deph_rate)).sqrt();
    let ptm: nd::Array2<f64> = nd::array![
        [1.0,       0.0, 0.0, 0.0            ],
        [0.0,       coh, 0.0, 0.0            ],
        [0.0,       0.0, coh, 0.0            ],
        [damp_rate, 0.0, 0.0, 1.0 - damp_rate],
    ];
    let gm = gell_mann1();
    Operation::from_ptm_unchecked(ptm.into_dyn(), &gm, &gm)
}

fn mixture_with_pauli(rate: f64, pauli: nd::Array2<C64>) -> Operation {
    let ident: nd::Array2<C64> = nd::Array2::eye(2) * re((1.0 - rate).sqrt());
    let flip = pauli * re(rate.sqrt());
    let mut kraus: nd::Array3<C64> = nd::Array3::zeros((2, 2, 2));
    kraus.index_axis_mut(nd::Axis(0), 0).assign(&ident);
    kraus.index_axis_mut(nd::Axis(0), 1).assign(&flip);
    Operation::from_kraus_unchecked(kraus, &qubit_bases1())
}

/// X flip applied with probability `flip_rate`.
pub fn bit_flipping(flip_rate: f64) -> Operation {
    mixture_with_pauli(flip_rate, nd::array![
        [zero(), one() ],
        [one(),  zero()],
    ])
}

/// Z flip applied with probability `flip_rate`.
pub fn phase_flipping(flip_rate: f64) -> Operation {
    mixture_with_pauli(flip_rate, nd::array![
        [one(),  zero() ],
        [zero(), re(-1.0)],
    ])
}

/// Y flip applied with probability `flip_rate`.
pub fn bit_phase_flipping(flip_rate: f64) -> Operation {
    mixture_with_pauli(flip_rate, nd::array![
        [zero(),   -C64::i()],
        [C64::i(), zero()   ],
    ])
}

/// Uniform depolarization: each Pauli error applied with probability
/// `rate / 4`; `rate = 1` gives the maximally depolarizing channel.
pub fn depolarization(rate: f64) -> Operation {
    let r = rate / 2.0;
    let keep = (1.0 - 1.5 * r).sqrt();
    let err = (r / 2.0).sqrt();
    let kraus: nd::Array3<C64> = nd::array![
        [[re(keep), zero()  ],
         [zero(),   re(keep)]],
        [[zero(),   re(err) ],
         [re(err),  zero()  ]],
        [[zero(),   -C64::i() * err],
         [C64::i() * err, zero()   ]],
        [[re(err),  zero()  ],
         [zero(),   re(-err)]],
    ];
    Operation::from_kraus_unchecked(kraus, &qubit_bases1())
}
