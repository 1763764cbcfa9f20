use std::rc::Rc;

use serde_json::json;

use grader::{
    solution_interface, Grader, GraderConfig, Harness, Outcome, SourceCompiler, TestVector,
    REFERENCE_FRAGMENT, REFERENCE_VECTORS,
};
use graderlib::{CompilerOptions, Compiler, Severity};
use gradervm::{
    BootstrapResolver, ClassRegistry, ClassResolver, Instance, InvocationError, LoadedType,
    MethodHandle, ResolutionStep, Value,
};

const QUALIFIED_NAME: &str = "com.getman.grader.SolutionImpl";

fn grader() -> Grader {
    Grader::new(GraderConfig::default()).unwrap()
}

fn grader_with(options: CompilerOptions) -> Grader {
    Grader::new(GraderConfig {
        options,
        ..Default::default()
    })
    .unwrap()
}

fn outcomes(grader: &Grader, fragment: &str) -> Vec<(i64, Outcome)> {
    grader
        .grade(fragment, &Harness::default())
        .report
        .verdicts
        .into_iter()
        .map(|v| (v.input, v.outcome))
        .collect()
}

#[test]
fn reference_fragment_passes_every_regression_vector() {
    similar_asserts::assert_eq!(
        expected: REFERENCE_VECTORS
            .iter()
            .map(|v| (v.input, Outcome::Correct))
            .collect::<Vec<_>>(),
        actual: outcomes(&grader(), REFERENCE_FRAGMENT),
    );
}

#[test]
fn wrong_fragment_is_classified_per_vector() {
    // counts every zero instead of the longest gap
    let fragment = "        let zeros = 0
        for (c in Integer.toBinaryString(N)) {
            if (c == '0') { zeros += 1 }
        }
        return zeros";
    similar_asserts::assert_eq!(
        expected: vec![
            (0, Outcome::Incorrect),
            (1, Outcome::Correct),
            (2, Outcome::Incorrect),
            (1041, Outcome::Incorrect),
            (601, Outcome::Incorrect),
            (600, Outcome::Incorrect),
        ],
        actual: outcomes(&grader(), fragment),
    );
}

#[test]
fn compilation_failure_falls_back() {
    let grader = grader();
    let submission = grader.new_impl("return N +");
    assert!(submission.is_fallback());
    assert!(submission.class.is_none());
    assert!(submission.registry.names().is_empty());
    let error = submission
        .diagnostics
        .with_severity(Severity::Error)
        .next()
        .expect("an error diagnostic");
    let position = error.position.expect("a source position");
    // the fragment starts on line 5, the parser stops at the closing brace below it
    assert!(matches!(position.line, 5 | 6), "{error}");
    assert_eq!(error.source.as_deref(), Some(QUALIFIED_NAME));

    let grade = grader.grade("return N +", &Harness::default());
    assert!(grade.report.fallback);
    assert_eq!(grade.report.passed, 0);
    assert!(grade.diagnostics.has_errors());
}

#[test]
fn type_errors_fall_back_with_every_diagnostic() {
    let grade = grader().grade("let s = \"a\" * 2\nreturn true", &Harness::default());
    assert!(grade.report.fallback);
    assert!(grade
        .report
        .verdicts
        .iter()
        .all(|v| v.outcome == Outcome::Incorrect));
    assert!(grade.diagnostics.error_count() >= 2, "{}", grade.diagnostics);
}

#[test]
fn invocation_is_deterministic() {
    let grader = grader();
    let submission = grader.new_impl(REFERENCE_FRAGMENT);
    for n in [0, 5, 1041, 1 << 40, -1] {
        let first = submission.solution.solution(n);
        assert_eq!(first, submission.solution.solution(n));
    }
    let first = grader.grade(REFERENCE_FRAGMENT, &Harness::default());
    let second = grader.grade(REFERENCE_FRAGMENT, &Harness::default());
    assert_eq!(first.report, second.report);
}

#[test]
fn sessions_produce_distinct_types() {
    let grader = grader();
    let a = grader.new_impl(REFERENCE_FRAGMENT);
    let b = grader.new_impl(REFERENCE_FRAGMENT);
    let class_a = a.class.unwrap();
    let class_b = b.class.unwrap();
    assert_eq!(class_a.name(), class_b.name());
    assert_ne!(class_a.loader(), class_b.loader());
    assert!(!LoadedType::same(&class_a, &class_b));

    let method = &solution_interface().methods[0];
    let handle = MethodHandle::bind(&class_a, method).unwrap();
    let foreign = Instance::new(&class_b).unwrap();
    assert!(matches!(
        handle.invoke(&foreign, vec![Value::Int(1041)]),
        Err(InvocationError::IncompatibleClass { .. })
    ));
    let own = Instance::new(&class_a).unwrap();
    assert_eq!(handle.invoke(&own, vec![Value::Int(1041)]), Ok(Value::Int(5)));
}

#[test]
fn registered_resources_are_the_compiled_bytes() {
    let grader = grader();
    let submission = grader.new_impl(REFERENCE_FRAGMENT);
    let expected = Compiler::new(CompilerOptions::default())
        .unwrap()
        .compile(
            QUALIFIED_NAME,
            &grader.render(REFERENCE_FRAGMENT),
            &ClassRegistry::standalone(),
            &[solution_interface()],
        )
        .unwrap()
        .artifacts
        .into_iter()
        .find(|a| a.name() == QUALIFIED_NAME)
        .unwrap();
    let registry = &submission.registry;
    assert_eq!(
        registry.find_resource(QUALIFIED_NAME).as_deref(),
        Some(expected.bytes())
    );
    assert_eq!(
        registry
            .find_resource("com/getman/grader/SolutionImpl.class")
            .as_deref(),
        Some(expected.bytes())
    );
}

#[test]
fn unknown_resources_fall_through_to_the_parent() {
    let parent = Rc::new(ClassRegistry::standalone());
    parent.register("lib.Blob", vec![1u8, 2, 3]).unwrap();
    let grader = grader().with_parent(parent);
    let submission = grader.new_impl(REFERENCE_FRAGMENT);
    assert_eq!(
        submission.registry.find_resource("lib/Blob.class"),
        Some(vec![1, 2, 3])
    );
    assert_eq!(submission.registry.find_resource("lib.Missing"), None);
}

#[test]
fn parent_classes_are_visible_to_fragments() {
    let parent = Rc::new(ClassRegistry::standalone());
    let library = Compiler::new(CompilerOptions::default())
        .unwrap()
        .compile(
            "lib.Util",
            "package lib\nclass Util {\n triple(n: Int) -> Int { return n * 3 }\n}",
            parent.as_ref(),
            &[],
        )
        .unwrap();
    for artifact in library.artifacts {
        parent.register(artifact.name(), artifact.bytes()).unwrap();
    }
    let grader = grader().with_parent(parent.clone());
    let submission = grader.new_impl("return lib.Util.triple(N)");
    assert!(!submission.is_fallback(), "{}", submission.diagnostics);
    assert_eq!(submission.solution.solution(7), Ok(21));

    let (step, util) = submission.registry.locate("lib.Util").unwrap();
    assert_eq!(step, ResolutionStep::Parent);
    assert_eq!(util.loader(), parent.id());
    assert!(LoadedType::same(&util, &parent.find_class("lib.Util").unwrap()));
}

#[test]
fn platform_classes_shadow_the_parent() {
    let parent = Rc::new(ClassRegistry::standalone());
    parent.register("Math", vec![0u8]).unwrap();
    let submission = grader().with_parent(parent).new_impl("return Math.abs(N)");
    assert_eq!(submission.solution.solution(-4), Ok(4));
    let (step, _) = submission.registry.locate("Math").unwrap();
    assert_eq!(step, ResolutionStep::Platform);
}

#[test]
fn warnings_do_not_prevent_grading() {
    let fragment = format!("let unused = 1\n{REFERENCE_FRAGMENT}");
    let grade = grader().grade(&fragment, &Harness::default());
    assert!(grade.report.all_passed());
    let warnings: Vec<_> = grade
        .diagnostics
        .with_severity(Severity::Warning)
        .map(|d| d.message.as_str())
        .collect();
    assert_eq!(warnings, ["variable `unused` is never used"]);
}

#[test]
fn verbose_compilation_reports_its_phases() {
    let grader = grader_with(CompilerOptions {
        verbose: true,
        ..Default::default()
    });
    let submission = grader.new_impl(REFERENCE_FRAGMENT);
    assert!(!submission.is_fallback());
    let notes: Vec<_> = submission
        .diagnostics
        .with_severity(Severity::Note)
        .map(|d| d.message.clone())
        .collect();
    assert_eq!(notes.first().map(String::as_str), Some("[parsing completed]"));
    assert!(notes
        .iter()
        .any(|n| n.starts_with(&format!("[wrote {QUALIFIED_NAME} ("))));
}

#[test]
fn debug_info_locates_runtime_errors() {
    let fragment = "        let d = N - N\n        return N / d";
    let vectors = Harness::new(vec![TestVector::new(3, 1)]);

    let grade = grader_with(CompilerOptions {
        debug_info: true,
        ..Default::default()
    })
    .grade(fragment, &vectors);
    similar_asserts::assert_eq!(
        expected: Some(format!("division by zero\n    at {QUALIFIED_NAME}.solution(line 6)")),
        actual: grade.report.verdicts[0].error.clone(),
    );

    let grade = grader().grade(fragment, &vectors);
    similar_asserts::assert_eq!(
        expected: Some(format!("division by zero\n    at {QUALIFIED_NAME}.solution(unknown source)")),
        actual: grade.report.verdicts[0].error.clone(),
    );
}

#[test]
fn runaway_recursion_is_an_incorrect_vector() {
    let grader = grader().with_template(graderlib::Template::new(
        "package $packageName\n\
         class $className implements Solution {\n\
         solution(N: Int) -> Int {\n$expression\n}\n\
         down(n: Int) -> Int { return down(n + 1) }\n\
         }",
    ));
    let grade = grader.grade("return down(N)", &Harness::new(vec![TestVector::new(1, 1)]));
    let verdict = &grade.report.verdicts[0];
    assert_eq!(verdict.outcome, Outcome::Incorrect);
    assert!(verdict
        .error
        .as_deref()
        .unwrap()
        .starts_with("stack overflow"));
}

#[test]
fn independent_compilers_share_nothing() {
    let options = CompilerOptions::default();
    let a = SourceCompiler::new(options.clone(), Rc::new(BootstrapResolver)).unwrap();
    let b = SourceCompiler::new(options, Rc::new(BootstrapResolver)).unwrap();
    let source = grader().render(REFERENCE_FRAGMENT);
    a.compile(QUALIFIED_NAME, &source, &[solution_interface()])
        .unwrap();
    assert!(a.registry().contains(QUALIFIED_NAME));
    assert!(!b.registry().contains(QUALIFIED_NAME));
    assert!(b.registry().find_class(QUALIFIED_NAME).is_err());
}

#[test]
fn deeply_nested_fragments_fall_back() {
    let nested = |depth: usize| format!("return {}N{}", "(".repeat(depth), ")".repeat(depth));
    let grader = grader();

    let submission = grader.new_impl(&nested(50));
    assert!(!submission.is_fallback(), "{}", submission.diagnostics);
    assert_eq!(submission.solution.solution(1041), Ok(1041));

    for depth in [200, 10_000] {
        let grade = grader.grade(&nested(depth), &Harness::default());
        assert!(grade.report.fallback);
        assert_eq!(grade.report.passed, 0);
        let error = grade
            .diagnostics
            .with_severity(Severity::Error)
            .next()
            .expect("an error diagnostic");
        assert!(error.message.contains("nested more than"), "{error}");
        assert_eq!(error.position.map(|p| p.line), Some(5));
    }
}

#[test]
fn classes_of_a_unit_may_call_each_other() {
    let fragment = "        return SolutionImpl.up(N)
    }
    up(n: Int) -> Int {
        if (n <= 0) { return 0 }
        return Helper.down(n - 1) + 1
    }
}

class Helper {
    down(n: Int) -> Int {
        return SolutionImpl.up(n)";
    let submission = grader().new_impl(fragment);
    assert!(!submission.is_fallback(), "{}", submission.diagnostics);
    assert_eq!(
        submission.registry.names(),
        ["com.getman.grader.Helper", QUALIFIED_NAME]
    );
    assert_eq!(submission.solution.solution(7), Ok(7));
    assert_eq!(submission.solution.solution(0), Ok(0));
}

#[test]
fn grades_serialize_for_the_json_report() {
    let vectors = Harness::new(vec![TestVector::new(1, 0)]);
    let grade = grader().grade("return N +", &vectors);
    let value = serde_json::to_value(&grade).unwrap();
    similar_asserts::assert_eq!(
        expected: json!({
            "fallback": true,
            "passed": 0,
            "total": 1,
            "verdicts": [{
                "input": 1,
                "expected": 0,
                "actual": 0,
                "outcome": "incorrect",
                "error": null,
            }],
        }),
        actual: value["report"].clone(),
    );
    assert_eq!(value["diagnostics"][0]["severity"], "error");
    assert_eq!(value["diagnostics"][0]["source"], QUALIFIED_NAME);

    let vectors = Harness::new(vec![TestVector::new(1041, 5)]);
    let grade = grader().grade(REFERENCE_FRAGMENT, &vectors);
    let text = serde_json::to_string(&grade).unwrap();
    assert!(text.contains(r#""outcome":"correct""#), "{text}");
    assert!(text.contains(r#""fallback":false"#), "{text}");
    assert!(text.contains(r#""diagnostics":["#), "{text}");
}
