//! End-to-end weaving: instrument sample assemblies and intercept their methods.

mod common;

use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
};

use common::*;
use dotweave::{
    emit::{RuntimeMethod, RuntimeType},
    instrument::fast_path_length,
    metadata::definitions::StaticAssembly,
    runtime::{slot, Interceptor, Invocation, Pointer, Value},
    Domain, Error, InstrumentOptions, Instrumenter, Strategy, TypeFilter,
};

fn instrumenter() -> Instrumenter {
    Instrumenter::new(TypeFilter::name_contains("Sample"))
}

fn doubler() -> Arc<dyn Interceptor> {
    Arc::new(|invocation: &mut Invocation| {
        invocation.proceed()?;
        let result = invocation.return_value()?.as_i32()?;
        invocation.set_return_value(Value::I4(result * 2))
    })
}

fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str, proceed: bool) -> Arc<dyn Interceptor> {
    let log = Arc::clone(log);
    Arc::new(move |invocation: &mut Invocation| {
        log.lock().unwrap().push(name);
        if proceed {
            invocation.proceed()
        } else {
            invocation.set_return_value(Value::I4(-1))
        }
    })
}

#[test]
fn woven_method_runs_the_original_body() {
    init_logging();
    let directory = tempfile::tempdir().unwrap();
    let source = save(&sample_assembly(), directory.path());
    let domain = Domain::new().unwrap();

    let assembly = instrumenter().instrument_and_load(&domain, Some(&source), None).unwrap();
    assert_eq!(call_m(&domain, &assembly, 41).unwrap(), 42);

    let m = method(&domain, &assembly, SAMPLE_CLASS, "M");
    assert!(domain.is_interceptable(m));
    let stub = domain.stub_field(m).unwrap();
    assert_eq!(domain.static_value(stub).unwrap(), Value::Null);
}

#[test]
fn interceptor_doubles_the_result() {
    let directory = tempfile::tempdir().unwrap();
    let source = save(&sample_assembly(), directory.path());
    let domain = Domain::new().unwrap();
    let assembly = instrumenter().instrument_and_load(&domain, Some(&source), None).unwrap();
    let m = method(&domain, &assembly, SAMPLE_CLASS, "M");

    domain.add_interceptor(m, doubler()).unwrap();
    assert_eq!(call_m(&domain, &assembly, 41).unwrap(), 84);

    // Calls from other woven code go through the chain as well.
    let run = method(&domain, &assembly, SAMPLE_CLASS, "Run");
    let result = domain
        .invoke(&RuntimeMethod::plain(run), None, vec![Value::I4(41)])
        .unwrap()
        .unwrap();
    assert_eq!(result.as_i32().unwrap(), 84);
}

#[test]
fn chain_runs_in_registration_order() {
    let directory = tempfile::tempdir().unwrap();
    let source = save(&sample_assembly(), directory.path());
    let domain = Domain::new().unwrap();
    let assembly = instrumenter().instrument_and_load(&domain, Some(&source), None).unwrap();
    let m = method(&domain, &assembly, SAMPLE_CLASS, "M");

    let log = Arc::new(Mutex::new(Vec::new()));
    domain.add_interceptor(m, recorder(&log, "A", true)).unwrap();
    domain.add_interceptor(m, recorder(&log, "B", true)).unwrap();
    assert_eq!(call_m(&domain, &assembly, 1).unwrap(), 2);
    assert_eq!(*log.lock().unwrap(), vec!["A", "B"]);
}

#[test]
fn skipping_proceed_stops_the_chain() {
    let directory = tempfile::tempdir().unwrap();
    let source = save(&sample_assembly(), directory.path());
    let domain = Domain::new().unwrap();
    let assembly = instrumenter().instrument_and_load(&domain, Some(&source), None).unwrap();
    let m = method(&domain, &assembly, SAMPLE_CLASS, "M");

    let log = Arc::new(Mutex::new(Vec::new()));
    domain.add_interceptor(m, recorder(&log, "A", false)).unwrap();
    domain.add_interceptor(m, recorder(&log, "B", true)).unwrap();
    assert_eq!(call_m(&domain, &assembly, 41).unwrap(), -1);
    assert_eq!(*log.lock().unwrap(), vec!["A"]);
}

#[test]
fn removing_the_last_interceptor_restores_the_fast_path() {
    let directory = tempfile::tempdir().unwrap();
    let source = save(&sample_assembly(), directory.path());
    let domain = Domain::new().unwrap();
    let assembly = instrumenter().instrument_and_load(&domain, Some(&source), None).unwrap();
    let m = method(&domain, &assembly, SAMPLE_CLASS, "M");

    let doubling = doubler();
    domain.add_interceptor(m, Arc::clone(&doubling)).unwrap();
    assert!(!domain.remove_interceptor(m, &doubler()).unwrap());
    assert_eq!(domain.interceptors(m).unwrap().len(), 1);
    assert_eq!(call_m(&domain, &assembly, 41).unwrap(), 84);

    assert!(domain.remove_interceptor(m, &doubling).unwrap());
    let stub = domain.stub_field(m).unwrap();
    assert_eq!(domain.static_value(stub).unwrap(), Value::Null);
    assert_eq!(call_m(&domain, &assembly, 41).unwrap(), 42);
}

#[test]
fn by_ref_arguments_are_copied_back() {
    let directory = tempfile::tempdir().unwrap();
    let source = save(&sample_assembly(), directory.path());
    let domain = Domain::new().unwrap();
    let assembly = instrumenter().instrument_and_load(&domain, Some(&source), None).unwrap();
    assert_eq!(call_increment(&domain, &assembly, 1).unwrap(), 2);

    let increment = method(&domain, &assembly, SAMPLE_CLASS, "Increment");
    domain
        .add_interceptor(increment, Arc::new(|invocation: &mut Invocation| invocation.proceed()))
        .unwrap();
    assert_eq!(call_increment(&domain, &assembly, 9).unwrap(), 10);
}

#[test]
fn saved_image_has_a_one_load_fast_path() {
    let directory = tempfile::tempdir().unwrap();
    let source = save(&sample_assembly(), directory.path());
    let output = directory.path().join("Samples.woven.dll");
    let domain = Domain::new().unwrap();
    instrumenter()
        .instrument_and_load(&domain, Some(&source), Some(&output))
        .unwrap();

    let woven = StaticAssembly::from_file(&output).unwrap();
    let module = woven.main_module().unwrap();
    let sample = module.find_type("Demo", "SampleClass").unwrap();
    let m = sample.methods_named("M").next().unwrap();
    let body = m.body.as_ref().unwrap();
    // ldsfld, brtrue, ldarg.0, ldarg.1, tail., call, ret
    assert_eq!(fast_path_length(body).unwrap(), 7);

    let helper = module.find_type("Demo", "Helper").unwrap();
    assert_eq!(helper.methods.len(), 1);
    assert!(fast_path_length(helper.methods[0].body.as_ref().unwrap()).is_err());
}

#[test]
fn unsupported_operands_fail_without_output() {
    let directory = tempfile::tempdir().unwrap();
    let source = save(&function_pointer_assembly(), directory.path());
    let output = directory.path().join("Pointers.woven.dll");
    let domain = Domain::new().unwrap();

    let result = instrumenter().instrument_and_load(&domain, Some(&source), Some(&output));
    assert!(matches!(result, Err(Error::UnsupportedConstruction(_))));
    assert!(!output.exists());
    assert!(domain.assembly_by_name("Pointers").is_none());
}

#[test]
fn missing_source_and_unreadable_files() {
    let directory = tempfile::tempdir().unwrap();
    let domain = Domain::new().unwrap();
    assert!(matches!(
        instrumenter().instrument_and_load(&domain, None, None),
        Err(Error::MissingArgument(_))
    ));
    assert!(matches!(
        instrumenter().instrument_and_load(&domain, Some(&directory.path().join("absent.dll")), None),
        Err(Error::FileError(_))
    ));
}

#[test]
fn dynamic_strategy_builds_selected_types_only() {
    let directory = tempfile::tempdir().unwrap();
    let source = save(&sample_assembly(), directory.path());
    let output = directory.path().join("never.dll");
    let domain = Domain::new().unwrap();
    let options = InstrumentOptions::new(TypeFilter::name_contains("Sample")).strategy(Strategy::Dynamic);

    let assembly = Instrumenter::with_options(options)
        .instrument_and_load(&domain, Some(&source), Some(&output))
        .unwrap();
    assert!(assembly.find_type(SAMPLE_CLASS).is_some());
    assert!(assembly.find_type("Demo.Helper").is_none());
    assert!(!output.exists());

    let m = method(&domain, &assembly, SAMPLE_CLASS, "M");
    assert_eq!(call_m(&domain, &assembly, 41).unwrap(), 42);
    domain.add_interceptor(m, doubler()).unwrap();
    assert_eq!(call_m(&domain, &assembly, 41).unwrap(), 84);
}

#[test]
fn unwoven_builds_are_not_interceptable() {
    let domain = Domain::new().unwrap();
    let options = InstrumentOptions::new(TypeFilter::all()).weave(false);
    let assembly = Instrumenter::with_options(options)
        .instrument(&domain, &sample_assembly())
        .unwrap();
    let m = method(&domain, &assembly, SAMPLE_CLASS, "M");
    assert!(!domain.is_interceptable(m));
    assert!(matches!(
        domain.add_interceptor(m, doubler()),
        Err(Error::NotInterceptable(_))
    ));
    assert_eq!(call_m(&domain, &assembly, 41).unwrap(), 42);
}

#[test]
fn calls_race_with_registration() {
    let directory = tempfile::tempdir().unwrap();
    let source = save(&sample_assembly(), directory.path());
    let domain = Domain::new().unwrap();
    let assembly = instrumenter().instrument_and_load(&domain, Some(&source), None).unwrap();
    let m = method(&domain, &assembly, SAMPLE_CLASS, "M");

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..32 {
                    assert_eq!(call_m(&domain, &assembly, 41).unwrap(), 42);
                }
            });
        }
        scope.spawn(|| {
            for _ in 0..16 {
                let passthrough: Arc<dyn Interceptor> = Arc::new(|invocation: &mut Invocation| invocation.proceed());
                domain.add_interceptor(m, Arc::clone(&passthrough)).unwrap();
                assert!(domain.remove_interceptor(m, &passthrough).unwrap());
            }
        });
    });
    assert!(domain.interceptors(m).unwrap().is_empty());
}

#[test]
fn independent_assemblies_instrument_in_parallel() {
    let directory = tempfile::tempdir().unwrap();
    let first = save(&sample_assembly(), directory.path());
    let mut other = sample_assembly();
    other.name.name = "OtherSamples".to_string();
    if let Some(module) = other.main_module_mut() {
        module.name = "OtherSamples.dll".to_string();
    }
    // Run references types by module name, so keep it out of the renamed copy.
    if let Some(module) = other.main_module_mut() {
        module.types[0].methods.retain(|method| method.name != "Run");
    }
    let second = save(&other, directory.path());

    let domain = Domain::new().unwrap();
    let results = instrumenter().instrument_all(&domain, &[first, second]);
    assert_eq!(results.len(), 2);
    for result in results {
        let assembly = result.unwrap();
        assert_eq!(call_m(&domain, &assembly, 1).unwrap(), 2);
    }
}

fn passthrough() -> Arc<dyn Interceptor> {
    Arc::new(|invocation: &mut Invocation| invocation.proceed())
}

fn exception_type(domain: &Domain, result: Result<i32, Error>) -> String {
    match result {
        Err(Error::Exception(exception)) => match exception.object_type() {
            RuntimeType::Type(handle) => domain.live_type(*handle).unwrap().full_name().to_string(),
            other => panic!("exception of unexpected type {other:?}"),
        },
        other => panic!("expected a managed exception, found {other:?}"),
    }
}

#[test]
fn value_type_receivers_keep_their_mutations() {
    let domain = Domain::new().unwrap();
    let assembly = instrumenter().instrument(&domain, &counter_assembly()).unwrap();
    let bump = method(&domain, &assembly, SAMPLE_COUNTER, "Bump");
    let counter = domain.find_type(assembly.name(), SAMPLE_COUNTER).unwrap();
    let storage = slot(Value::Struct {
        ty: RuntimeType::Type(counter),
        fields: vec![Value::I4(0)],
    });
    let call = || {
        domain
            .invoke(
                &RuntimeMethod::plain(bump),
                Some(Value::ByRef(Pointer::Slot(storage.clone()))),
                vec![],
            )
            .unwrap()
            .unwrap()
            .as_i32()
            .unwrap()
    };
    let count = || match &*storage.lock().unwrap() {
        Value::Struct { fields, .. } => fields[0].clone(),
        other => panic!("storage holds {other:?}"),
    };

    assert_eq!(call(), 1);
    assert_eq!(count(), Value::I4(1));

    domain.add_interceptor(bump, passthrough()).unwrap();
    assert_eq!(call(), 2);
    assert_eq!(count(), Value::I4(2));
    assert_eq!(call(), 3);
    assert_eq!(count(), Value::I4(3));
}

#[test]
fn exceptions_reach_the_caller_unchanged() {
    let domain = Domain::new().unwrap();
    let assembly = instrumenter().instrument(&domain, &faults_assembly()).unwrap();
    let divide = |x| call_static(&domain, &assembly, SAMPLE_FAULTS, "Divide", vec![Value::I4(x)]);
    let guarded = |x| call_static(&domain, &assembly, SAMPLE_FAULTS, "Guarded", vec![Value::I4(x)]);

    assert_eq!(divide(5).unwrap(), 2);
    assert_eq!(exception_type(&domain, divide(0)), "System.DivideByZeroException");
    assert_eq!(guarded(0).unwrap(), -1);

    let handle = method(&domain, &assembly, SAMPLE_FAULTS, "Divide");
    let seen = Arc::new(Mutex::new(0));
    let counted = Arc::clone(&seen);
    domain
        .add_interceptor(
            handle,
            Arc::new(move |invocation: &mut Invocation| {
                *counted.lock().unwrap() += 1;
                invocation.proceed()
            }),
        )
        .unwrap();

    assert_eq!(divide(5).unwrap(), 2);
    assert_eq!(exception_type(&domain, divide(0)), "System.DivideByZeroException");
    assert_eq!(guarded(0).unwrap(), -1);
    assert_eq!(guarded(2).unwrap(), 5);
    assert_eq!(*seen.lock().unwrap(), 4);
}

#[test]
fn concurrent_builds_load_a_shared_library_once() {
    let directory = tempfile::tempdir().unwrap();
    save(&library_assembly(), directory.path());
    let users: Vec<PathBuf> = (0..8).map(|index| save(&user_assembly(index), directory.path())).collect();

    for _ in 0..10 {
        let domain = Domain::with_search_paths(vec![directory.path().to_path_buf()]).unwrap();
        std::thread::scope(|scope| {
            for user in &users {
                let domain = &domain;
                scope.spawn(move || {
                    let assembly = instrumenter().instrument_and_load(domain, Some(user), None).unwrap();
                    assert_eq!(call_static(domain, &assembly, SAMPLE_USER, "Go", vec![]).unwrap(), 2);
                });
            }
        });
        let libraries = domain
            .assemblies()
            .iter()
            .filter(|assembly| assembly.name() == LIBRARY)
            .count();
        assert_eq!(libraries, 1);
    }
}
