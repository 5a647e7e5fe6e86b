//! Structured-grid inner products: box and rank decomposition independence,
//! complex conjugation, ghost layouts and FLOP accounting.

use std::sync::Arc;

use approx::assert_abs_diff_eq;
use kryst_kernels::ops::{struct_complex_inner_prod, struct_inner_prod};
use kryst_kernels::parallel::{Comm, SerialComm, ThreadComm, UniverseComm};
use kryst_kernels::structured::{Index, IndexBox, StructGrid, StructVector};
use kryst_kernels::utils::{flop_count, reset_flop_count};
use kryst_kernels::KError;
use num_complex::Complex;

fn fx(p: Index) -> f64 {
    ((p[0] * 3 + p[1] * 5) % 11) as f64 - 4.0
}

fn fy(p: Index) -> f64 {
    ((p[0] + 2 * p[1]) % 7) as f64 * 0.5
}

fn cx(p: Index) -> Complex<f64> {
    Complex::new(fx(p), fy(p))
}

fn cy(p: Index) -> Complex<f64> {
    Complex::new(fy(p) - 1.0, (p[0] - p[1]) as f64)
}

fn grid<C: Comm>(comm: &C, boxes: Vec<IndexBox>) -> Arc<StructGrid> {
    Arc::new(StructGrid::assemble(comm, 2, boxes).unwrap())
}

/// 8×6 grid as a single box.
fn whole() -> Vec<IndexBox> {
    vec![IndexBox::new([0, 0, 0], [7, 5, 0])]
}

/// The same 8×6 grid as four uneven boxes.
fn quarters() -> Vec<IndexBox> {
    vec![
        IndexBox::new([0, 0, 0], [2, 3, 0]),
        IndexBox::new([3, 0, 0], [7, 3, 0]),
        IndexBox::new([0, 4, 0], [4, 5, 0]),
        IndexBox::new([5, 4, 0], [7, 5, 0]),
    ]
}

fn real_pair(g: &Arc<StructGrid>, ghost_x: usize, ghost_y: usize) -> (StructVector<f64>, StructVector<f64>) {
    let mut x = StructVector::new(g.clone(), ghost_x).unwrap();
    let mut y = StructVector::new(g.clone(), ghost_y).unwrap();
    x.fill_with(fx);
    y.fill_with(fy);
    (x, y)
}

fn reference() -> f64 {
    let mut s = 0.0;
    for j in 0..6 {
        for i in 0..8 {
            s += fx([i, j, 0]) * fy([i, j, 0]);
        }
    }
    s
}

#[test]
fn three_point_example() {
    let g = Arc::new(StructGrid::assemble(&SerialComm, 1, vec![IndexBox::line(0, 2)]).unwrap());
    let mut x = StructVector::<f64>::new(g.clone(), 0).unwrap();
    let mut y = StructVector::<f64>::new(g, 0).unwrap();
    x.set_box_values(0, &[1.0, 2.0, 3.0]).unwrap();
    y.set_box_values(0, &[4.0, 5.0, 6.0]).unwrap();
    assert_eq!(struct_inner_prod(&SerialComm, &x, &y).unwrap(), 32.0);
}

#[test]
fn box_decomposition_does_not_matter() {
    let (x1, y1) = real_pair(&grid(&SerialComm, whole()), 1, 1);
    let (x4, y4) = real_pair(&grid(&SerialComm, quarters()), 1, 1);
    let one = struct_inner_prod(&SerialComm, &x1, &y1).unwrap();
    let four = struct_inner_prod(&SerialComm, &x4, &y4).unwrap();
    assert_abs_diff_eq!(one, reference(), epsilon = 1e-12);
    assert_abs_diff_eq!(four, reference(), epsilon = 1e-12);
}

#[test]
fn ghost_width_does_not_matter() {
    let g = grid(&SerialComm, quarters());
    let (x, y) = real_pair(&g, 0, 3);
    let mut noisy = StructVector::<f64>::new(g.clone(), 2).unwrap();
    for i in 0..g.num_boxes() {
        noisy.box_data_mut(i).fill(1e6);
    }
    // ghost points keep the garbage
    noisy.fill_with(fy);
    let a = struct_inner_prod(&SerialComm, &x, &y).unwrap();
    let b = struct_inner_prod(&SerialComm, &x, &noisy).unwrap();
    assert_abs_diff_eq!(a, reference(), epsilon = 1e-12);
    assert_abs_diff_eq!(b, reference(), epsilon = 1e-12);
}

#[test]
fn rank_decomposition_does_not_matter() {
    let all = quarters();
    let results = ThreadComm::run(3, |comm| {
        // rank 0 takes two boxes, ranks 1 and 2 one each
        let mine = match comm.rank() {
            0 => vec![all[0], all[1]],
            r => vec![all[r + 1]],
        };
        let g = grid(&comm, mine);
        let (x, y) = real_pair(&g, 1, 0);
        reset_flop_count();
        let dot = struct_inner_prod(&comm, &x, &y).unwrap();
        (g.global_size(), dot, flop_count())
    });
    for (global, dot, flops) in results {
        assert_eq!(global, 48);
        assert_abs_diff_eq!(dot, reference(), epsilon = 1e-12);
        assert_eq!(flops, 2 * 48);
    }
}

#[test]
fn complex_product_conjugates_y() {
    let g = Arc::new(StructGrid::assemble(&SerialComm, 1, vec![IndexBox::line(0, 0)]).unwrap());
    let (a, b, c, d) = (2.0, -3.0, 0.5, 4.0);
    let mut x = StructVector::new(g.clone(), 1).unwrap();
    let mut y = StructVector::new(g, 1).unwrap();
    x.set_box_values(0, &[Complex::new(a, b)]).unwrap();
    y.set_box_values(0, &[Complex::new(c, d)]).unwrap();
    let z = struct_complex_inner_prod(&SerialComm, &x, &y).unwrap();
    assert_abs_diff_eq!(z.re, a * c + b * d, epsilon = 1e-15);
    assert_abs_diff_eq!(z.im, b * c - a * d, epsilon = 1e-15);
}

#[test]
fn complex_across_ranks_and_flops() {
    let mut expect = Complex::new(0.0, 0.0);
    for j in 0..6 {
        for i in 0..8 {
            expect += cx([i, j, 0]) * cy([i, j, 0]).conj();
        }
    }
    let all = quarters();
    let results = ThreadComm::run(4, |comm| {
        let g = grid(&comm, vec![all[comm.rank()]]);
        let mut x = StructVector::new(g.clone(), 1).unwrap();
        let mut y = StructVector::new(g, 2).unwrap();
        x.fill_with(cx);
        y.fill_with(cy);
        reset_flop_count();
        let z = struct_complex_inner_prod(&comm, &x, &y).unwrap();
        let complex_flops = reset_flop_count();
        let r = struct_inner_prod(&comm, &x, &y).unwrap();
        (z, r, complex_flops, flop_count())
    });
    for (z, r, complex_flops, real_flops) in results {
        assert_abs_diff_eq!(z.re, expect.re, epsilon = 1e-12);
        assert_abs_diff_eq!(z.im, expect.im, epsilon = 1e-12);
        // the real product of complex data is the real part of x·conj(y)
        assert_abs_diff_eq!(r, expect.re, epsilon = 1e-12);
        assert_eq!(complex_flops, 8 * 48);
        assert_eq!(real_flops, 4 * 48);
    }
}

#[test]
fn every_rank_gets_the_same_value() {
    let results = ThreadComm::run(4, |comm| {
        let lo = 5 * comm.rank() as i64;
        let g = Arc::new(StructGrid::assemble(&comm, 1, vec![IndexBox::line(lo, lo + 4)]).unwrap());
        let mut x = StructVector::<f64>::new(g.clone(), 0).unwrap();
        x.fill_with(|p| 1.0 / (1.0 + p[0] as f64));
        struct_inner_prod(&comm, &x, &x).unwrap()
    });
    assert!(results.windows(2).all(|w| w[0].to_bits() == w[1].to_bits()));
}

#[test]
fn vectors_on_different_grids_rejected() {
    let x = StructVector::<f64>::new(grid(&SerialComm, whole()), 0).unwrap();
    let y = StructVector::<f64>::new(grid(&SerialComm, quarters()), 0).unwrap();
    assert!(matches!(struct_inner_prod(&SerialComm, &x, &y), Err(KError::GridMismatch(_))));
}

#[test]
fn runtime_selected_world() {
    let world = UniverseComm::world();
    let g = grid(&world, whole());
    let (x, y) = real_pair(&g, 0, 0);
    let dot = struct_inner_prod(&world, &x, &y).unwrap();
    if world.size() == 1 {
        assert_abs_diff_eq!(dot, reference(), epsilon = 1e-12);
    }
}
