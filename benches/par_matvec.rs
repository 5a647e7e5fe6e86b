use criterion::{black_box, Criterion, criterion_group, criterion_main};
use kryst_kernels::matrix::{CsrMatrix, ParCsrMatrix};
use kryst_kernels::ops::{par_matvec_with, struct_inner_prod_with};
use kryst_kernels::parallel::{Comm, SerialComm, ThreadComm};
use kryst_kernels::structured::{IndexBox, StructGrid, StructVector};
use kryst_kernels::vector::{uniform_partition, ParVector};
use kryst_kernels::KernelOptions;
use std::sync::Arc;

/// 5-point Laplacian on an n×n grid.
fn laplacian_2d(n: usize) -> CsrMatrix {
    let mut t = Vec::with_capacity(5 * n * n);
    for j in 0..n {
        for i in 0..n {
            let row = j * n + i;
            t.push((row, row, 4.0));
            if i > 0 { t.push((row, row - 1, -1.0)); }
            if i + 1 < n { t.push((row, row + 1, -1.0)); }
            if j > 0 { t.push((row, row - n, -1.0)); }
            if j + 1 < n { t.push((row, row + n, -1.0)); }
        }
    }
    CsrMatrix::from_triplets(n * n, n * n, &t).unwrap()
}

fn bench_matvec(c: &mut Criterion) {
    let n = 200;
    let g = laplacian_2d(n);
    let x: Vec<f64> = (0..n * n).map(|i| (i as f64).sin()).collect();

    for threshold in [usize::MAX, 4096] {
        let opts = KernelOptions::default().with_parallel_threshold(threshold);
        let a = ParCsrMatrix::from_global_csr(&g, vec![0, n * n], vec![0, n * n], 0).unwrap();
        let xv = ParVector::from_local(n * n, 0, x.clone());
        let mut yv = ParVector::from_local(n * n, 0, vec![0.0; n * n]);
        let label = if threshold == usize::MAX { "par_matvec serial rows" } else { "par_matvec rayon rows" };
        c.bench_function(label, |ben| {
            ben.iter(|| {
                par_matvec_with(&SerialComm, 1.0, black_box(&a), black_box(&xv), 0.0, &mut yv, &opts).unwrap();
            })
        });
    }

    // Four ranks on threads, including pattern construction and thread startup.
    c.bench_function("par_matvec 4 thread ranks", |ben| {
        let starts = uniform_partition(n * n, 4);
        ben.iter(|| {
            ThreadComm::run(4, |comm| {
                let rank = comm.rank();
                let a = ParCsrMatrix::from_global_csr(&g, starts.clone(), starts.clone(), rank).unwrap();
                let xv = ParVector::from_global(&x, &starts, rank).unwrap();
                let mut yv = ParVector::zeros(&starts, rank).unwrap();
                for _ in 0..10 {
                    par_matvec_with(&comm, 1.0, &a, &xv, 0.0, &mut yv, &KernelOptions::default()).unwrap();
                }
                black_box(yv.local()[0])
            })
        })
    });
}

fn bench_inner_prod(c: &mut Criterion) {
    let grid = Arc::new(StructGrid::assemble(&SerialComm, 3, vec![IndexBox::new([0, 0, 0], [63, 63, 63])]).unwrap());
    let mut x = StructVector::<f64>::new(grid.clone(), 1).unwrap();
    let mut y = StructVector::<f64>::new(grid, 1).unwrap();
    x.fill_with(|p| (p[0] + p[1]) as f64);
    y.fill_with(|p| (p[2] - p[0]) as f64);
    let opts = KernelOptions::default();

    c.bench_function("struct_inner_prod 64^3", |ben| {
        ben.iter(|| struct_inner_prod_with(&SerialComm, black_box(&x), black_box(&y), &opts).unwrap())
    });
}

criterion_group!(benches, bench_matvec, bench_inner_prod);
criterion_main!(benches);
