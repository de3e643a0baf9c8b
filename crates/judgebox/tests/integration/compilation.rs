use judgebox::{COMPILATION_ERROR_PREFIX, ExecutionRequest, ExecutionStatus};

use super::{fixture_source, test_judge};

#[tokio::test]
#[ignore = "requires docker"]
async fn test_compile_error_cpp() {
    let (judge, _runtime) = test_judge();
    let request = ExecutionRequest::new("cpp", fixture_source("compile_error.cpp"));

    let result = judge.execute(&request).await.expect("Execution failed");

    assert!(!result.is_success());
    assert_eq!(result.status, ExecutionStatus::CompilationError);
    assert!(result.error.starts_with(COMPILATION_ERROR_PREFIX));
    assert!(result.error.contains("main.cpp"));
    assert_eq!(result.output, "");
    assert_eq!(result.execution_time_ms, 0);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_compile_error_java() {
    let (judge, _runtime) = test_judge();
    let request = ExecutionRequest::new("java", "public class Main { void f() { int x = } }");

    let result = judge.execute(&request).await.unwrap();

    assert_eq!(result.status, ExecutionStatus::CompilationError);
    assert!(result.error.contains("Main.java"));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_compiler_warnings_do_not_fail() {
    let (judge, _runtime) = test_judge();
    let source = "#include <stdio.h>\nint main(void) { int unused; printf(\"ok\\n\"); return 0; }\n";
    let request = ExecutionRequest::new("c", source);

    let result = judge.execute(&request).await.unwrap();

    assert!(result.is_success(), "{result:?}");
    assert_eq!(result.output, "ok\n");
}
