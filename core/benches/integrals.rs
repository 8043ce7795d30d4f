use std::error::Error;

use criterion::{criterion_group, criterion_main, Criterion};
use intor::{
    autograd::Tape,
    basis::{AtomBasis, BasisWrapper, Shell},
    intor::{nuclattr, BasisParams, Intor, Operator, Shortname},
    testing::TestInstance,
};
use nalgebra::Vector3;

fn hydrogen_sto3g() -> TestInstance {
    let s = Shell::new(
        0,
        &[3.425250914, 0.6239137298, 0.1688554040],
        &[0.1543289673, 0.5353281423, 0.4446345422],
    );
    TestInstance::new(
        "hydrogen STO-3G".into(),
        vec![
            AtomBasis::new(1.0, Vector3::zeros(), vec![s.clone()]),
            AtomBasis::new(1.0, Vector3::new(0.0, 0.0, 1.4), vec![s]),
        ],
    )
}

fn water_sto3g() -> TestInstance {
    let h = Shell::new(
        0,
        &[3.425250914, 0.6239137298, 0.1688554040],
        &[0.1543289673, 0.5353281423, 0.4446345422],
    );
    let o_core = Shell::new(
        0,
        &[130.7093200, 23.80886100, 6.443608300],
        &[0.1543289673, 0.5353281423, 0.4446345422],
    );
    let sp_exponents = [5.033151300, 1.169596100, 0.3803890000];
    let o_valence_s = Shell::new(
        0,
        &sp_exponents,
        &[-0.09996722919, 0.3995128261, 0.7001154689],
    );
    let o_valence_p = Shell::new(
        1,
        &sp_exponents,
        &[0.1559162750, 0.6076837186, 0.3919573931],
    );
    TestInstance::new(
        "water STO-3G".into(),
        vec![
            AtomBasis::new(
                8.0,
                Vector3::zeros(),
                vec![o_core, o_valence_s, o_valence_p],
            ),
            AtomBasis::new(1.0, Vector3::new(0.0, -1.43233673, -0.96104039), vec![h.clone()]),
            AtomBasis::new(1.0, Vector3::new(0.0, 1.43233673, -0.96104039), vec![h]),
        ],
    )
}

fn bench_overlap(c: &mut Criterion, instances: &[&TestInstance]) -> Result<(), Box<dyn Error>> {
    for instance in instances {
        let wrapper = BasisWrapper::new(instance.atoms(), false);
        let name = Shortname::new(Operator::Ovlp);

        c.bench_function(&format!("Overlap {}", instance.name), |b| {
            b.iter(|| Intor::new(&name, &[&wrapper, &wrapper]).calc())
        });
    }

    Ok(())
}

fn bench_electron(c: &mut Criterion, instances: &[&TestInstance]) -> Result<(), Box<dyn Error>> {
    for instance in instances {
        let wrapper = BasisWrapper::new(instance.atoms(), false);
        let name = Shortname::new(Operator::Ar12b);

        c.bench_function(&format!("Electron Repulsion {}", instance.name), |b| {
            b.iter(|| Intor::new(&name, &[&wrapper, &wrapper, &wrapper, &wrapper]).calc())
        });
    }

    Ok(())
}

fn bench_nuclear_gradient(
    c: &mut Criterion,
    instances: &[&TestInstance],
) -> Result<(), Box<dyn Error>> {
    for instance in instances {
        let wrapper = BasisWrapper::new(instance.atoms(), false);

        c.bench_function(&format!("Nuclear Gradient {}", instance.name), |b| {
            b.iter(|| {
                let tape = Tape::new();
                let params = BasisParams::new(&tape, &wrapper, [false, false, true]);
                let out = nuclattr(&tape, &params, &wrapper, None);
                tape.backward(out)
            })
        });
    }

    Ok(())
}

fn bench_integrals(c: &mut Criterion) -> Result<(), Box<dyn Error>> {
    let hydrogen_sto3g = hydrogen_sto3g();
    let water_sto3g = water_sto3g();

    bench_overlap(c, &[&hydrogen_sto3g, &water_sto3g])?;
    bench_electron(c, &[&hydrogen_sto3g, &water_sto3g])?;
    bench_nuclear_gradient(c, &[&hydrogen_sto3g, &water_sto3g])?;

    Ok(())
}

fn benches_entry(c: &mut Criterion) {
    bench_integrals(c).unwrap();
}

criterion_group!(benches, benches_entry);
criterion_main!(benches);
