//! Pipeline benchmarks: lex, parse, resolve, encode, decode.

use std::fmt::Write as _;
use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use rapconf::{decode, decode_class, encode, format, parse_str, resolve, tokenize};

const COMPLEX: &str = include_str!("../tests/fixtures/complex.cpp");

/// A vehicle config with `count` classes, each inheriting from the
/// previous one and appending to an inherited array.
fn generate_config(count: usize) -> String {
    let mut source = String::from("class CfgVehicles\n{\n\tclass Base\n\t{\n\t\tcrew[] = {\"driver\"};\n\t};\n");
    let mut parent = String::from("Base");
    for i in 0..count {
        let name = format!("Vehicle{i}");
        let _ = write!(
            source,
            "\tclass {name}: {parent}\n\t{{\n\
             \t\tdisplayName = \"Vehicle {i}\";\n\
             \t\tmaxSpeed = {};\n\
             \t\tcrew[] += {{\"gunner{i}\"}};\n\
             \t\tclass Turrets {{ class Main {{ elevation = {}.5; }}; }};\n\
             \t}};\n",
            100 + i,
            i % 90
        );
        parent = name;
    }
    source.push_str("};\n");
    source
}

fn bench_lex(c: &mut Criterion) {
    c.bench_function("lex_complex_fixture", |b| {
        b.iter(|| tokenize(black_box(COMPLEX)))
    });
}

fn bench_parse(c: &mut Criterion) {
    c.bench_function("parse_complex_fixture", |b| {
        b.iter(|| parse_str(black_box(COMPLEX)))
    });

    let source = generate_config(200);
    c.bench_function("parse_generated_200_classes", |b| {
        b.iter(|| parse_str(black_box(&source)))
    });
}

fn bench_resolve(c: &mut Criterion) {
    let tree = parse_str(&generate_config(200)).expect("parse");
    c.bench_function("resolve_all_200_class_chain", |b| {
        b.iter(|| {
            resolve(black_box(&tree))
                .and_then(|resolved| resolved.resolve_all())
                .map(|classes| classes.len())
        })
    });
}

fn bench_codec(c: &mut Criterion) {
    let tree = parse_str(COMPLEX).expect("parse");
    let bytes = encode(&tree);

    c.bench_function("encode_complex_fixture", |b| {
        b.iter(|| encode(black_box(&tree)))
    });
    c.bench_function("decode_complex_fixture", |b| {
        b.iter(|| decode(black_box(&bytes)))
    });
    c.bench_function("decode_class_complex_fixture", |b| {
        b.iter(|| decode_class(black_box(&bytes), "CfgTimeTrials/Helpers/Sign_Circle_F"))
    });
}

fn bench_format(c: &mut Criterion) {
    let tree = parse_str(COMPLEX).expect("parse");
    c.bench_function("format_complex_fixture", |b| {
        b.iter(|| format(black_box(&tree)))
    });
}

criterion_group!(
    benches,
    bench_lex,
    bench_parse,
    bench_resolve,
    bench_codec,
    bench_format
);
criterion_main!(benches);
