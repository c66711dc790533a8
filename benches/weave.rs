//! Benchmarks for woven method calls and for the instrumentation pipeline.
//!
//! Compares the cost of calling a method:
//! - before weaving
//! - after weaving, with no interceptor registered (fast path)
//! - after weaving, with a pass-through interceptor (slow path)
//!
//! and measures weaving plus staged building of a small assembly.

extern crate dotweave;

use std::{hint::black_box, sync::Arc};

use criterion::{criterion_group, criterion_main, Criterion};
use dotweave::{
    disassembler::OpCode,
    emit::RuntimeMethod,
    metadata::{
        definitions::{MethodAttributes, MethodDefinition, StaticAssembly, TypeAttributes, TypeDefinition},
        method::{Instruction, MethodBody},
        signatures::MethodSignature,
        typesystem::{AssemblyName, TypeReference},
    },
    runtime::{Invocation, Value},
    Domain, InstrumentOptions, Instrumenter, TypeFilter,
};

/// `static int Bench.SampleMath.Next(int x) => x + 1`
fn math_assembly(name: &str) -> StaticAssembly {
    let mut assembly = StaticAssembly::new(AssemblyName::new(name));
    let mut ty = TypeDefinition::new("Bench", "SampleMath", TypeAttributes::PUBLIC).extends(TypeReference::object());
    ty.methods.push(
        MethodDefinition::new(
            "Next",
            MethodAttributes::PUBLIC | MethodAttributes::STATIC,
            MethodSignature::new_static(TypeReference::int32(), vec![TypeReference::int32()]),
        )
        .with_body(
            MethodBody::new()
                .push(Instruction::load_argument(0))
                .push(Instruction::load_int32(1))
                .push(Instruction::simple(OpCode::Add))
                .push(Instruction::simple(OpCode::Ret)),
        ),
    );
    assembly.main_module_mut().unwrap().types.push(ty);
    assembly
}

fn next_method(domain: &Domain, assembly: &str) -> RuntimeMethod {
    RuntimeMethod::plain(domain.find_method(assembly, "Bench.SampleMath", "Next").unwrap())
}

fn bench_plain_call(c: &mut Criterion) {
    let domain = Domain::new().unwrap();
    domain.load_static(&math_assembly("Plain")).unwrap();
    let next = next_method(&domain, "Plain");

    c.bench_function("call_unwoven", |b| {
        b.iter(|| black_box(domain.invoke(&next, None, vec![Value::I4(black_box(41))]).unwrap()));
    });
}

fn bench_fast_path(c: &mut Criterion) {
    let domain = Domain::new().unwrap();
    Instrumenter::new(TypeFilter::all())
        .instrument(&domain, &math_assembly("Fast"))
        .unwrap();
    let next = next_method(&domain, "Fast");

    c.bench_function("call_woven_fast_path", |b| {
        b.iter(|| black_box(domain.invoke(&next, None, vec![Value::I4(black_box(41))]).unwrap()));
    });
}

fn bench_slow_path(c: &mut Criterion) {
    let domain = Domain::new().unwrap();
    Instrumenter::new(TypeFilter::all())
        .instrument(&domain, &math_assembly("Slow"))
        .unwrap();
    let next = next_method(&domain, "Slow");
    domain
        .add_interceptor(next.handle, Arc::new(|invocation: &mut Invocation| invocation.proceed()))
        .unwrap();

    c.bench_function("call_woven_slow_path", |b| {
        b.iter(|| black_box(domain.invoke(&next, None, vec![Value::I4(black_box(41))]).unwrap()));
    });
}

fn bench_instrument(c: &mut Criterion) {
    let source = math_assembly("Built");
    let instrumenter = Instrumenter::with_options(InstrumentOptions::new(TypeFilter::all()));

    c.bench_function("weave_and_build", |b| {
        b.iter(|| {
            // A fresh domain per iteration, since assembly names must be unique.
            let domain = Domain::new().unwrap();
            black_box(instrumenter.instrument(&domain, black_box(&source)).unwrap())
        });
    });
}

criterion_group!(
    benches,
    bench_plain_call,
    bench_fast_path,
    bench_slow_path,
    bench_instrument,
);
criterion_main!(benches);
