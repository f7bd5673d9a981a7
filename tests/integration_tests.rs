//! End-to-end compilation tests driving the full pipeline through an
//! in-memory host: scanner, parser, binder, loader, checker, decorators,
//! and the state registry.

use cadlc::binder::NodeRef;
use cadlc::checker::types::{DecoratorArgValue, EnumValue, Type, TypeId};
use cadlc::diagnostics::{codes, Diagnostic, DiagnosticTarget};
use cadlc::parser::NodeKind;
use cadlc::program::host::{
    CompilerHost, ExportValue, FileStat, HostError, ModuleExports, SourceText,
};
use cadlc::program::{compile, next_state_key, CompilerOptions, Program, StateKey};
use cadlc::{FileId, Span};
use once_cell::sync::Lazy;
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// =============================================================================
// In-memory host
// =============================================================================

#[derive(Default)]
struct TestHost {
    files: FxHashMap<PathBuf, String>,
    modules: FxHashMap<PathBuf, ModuleExports>,
    dirs: FxHashSet<PathBuf>,
    lib_dirs: Vec<PathBuf>,
}

impl TestHost {
    fn new() -> TestHost {
        TestHost::default()
    }

    fn add_file(&mut self, path: &str, text: &str) {
        let path = PathBuf::from(path);
        self.register_dirs(&path);
        self.files.insert(path, text.to_string());
    }

    fn add_module(&mut self, path: &str, exports: ModuleExports) {
        let path = PathBuf::from(path);
        self.register_dirs(&path);
        self.modules.insert(path, exports);
    }

    fn register_dirs(&mut self, path: &Path) {
        let mut current = path.parent();
        while let Some(dir) = current {
            if dir.as_os_str().is_empty() {
                break;
            }
            self.dirs.insert(dir.to_path_buf());
            current = dir.parent();
        }
    }
}

impl CompilerHost for TestHost {
    fn read_file(&self, path: &Path) -> Result<SourceText, HostError> {
        match self.files.get(path) {
            Some(text) => Ok(SourceText {
                path: path.to_path_buf(),
                text: text.clone(),
            }),
            None => Err(HostError::NotFound(path.to_path_buf())),
        }
    }

    fn stat(&self, path: &Path) -> Result<FileStat, HostError> {
        if self.files.contains_key(path) || self.modules.contains_key(path) {
            Ok(FileStat {
                is_file: true,
                is_directory: false,
            })
        } else if self.dirs.contains(path) {
            Ok(FileStat {
                is_file: false,
                is_directory: true,
            })
        } else {
            Err(HostError::NotFound(path.to_path_buf()))
        }
    }

    fn realpath(&self, path: &Path) -> Result<PathBuf, HostError> {
        Ok(path.to_path_buf())
    }

    fn get_external_module_exports(&self, path: &Path) -> Result<ModuleExports, HostError> {
        match self.modules.get(path) {
            Some(exports) => Ok(exports.clone()),
            None => Err(HostError::NotFound(path.to_path_buf())),
        }
    }

    fn get_lib_dirs(&self) -> Vec<PathBuf> {
        self.lib_dirs.clone()
    }

    fn write_file(&self, _path: &Path, _content: &str) -> Result<(), HostError> {
        Ok(())
    }

    fn resolve_absolute_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            PathBuf::from("/test").join(path)
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn compile_files(files: &[(&str, &str)]) -> Program {
    compile_with_host(files, TestHost::new())
}

fn compile_with_host(files: &[(&str, &str)], mut host: TestHost) -> Program {
    for (path, text) in files {
        host.add_file(path, text);
    }
    let options = CompilerOptions {
        no_std_lib: true,
        no_emit: true,
        ..CompilerOptions::default()
    };
    compile(Arc::new(host), Path::new("/test/main.cadl"), options)
}

fn compile_main(text: &str) -> Program {
    compile_files(&[("/test/main.cadl", text)])
}

fn assert_no_diagnostics(program: &Program) {
    let all: Vec<String> = program
        .diagnostics()
        .iter()
        .map(|d| format!("{} {}", d.code, d.message))
        .collect();
    assert!(all.is_empty(), "unexpected diagnostics: {:?}", all);
}

fn error_messages(program: &Program) -> Vec<String> {
    program
        .diagnostics()
        .errors()
        .map(|d| d.message.clone())
        .collect()
}

fn model_properties(program: &Program, name: &str) -> Vec<(String, TypeId)> {
    let model = program
        .global_member(name)
        .unwrap_or_else(|| panic!("model '{}' not found in global namespace", name));
    match program.types.get(model) {
        Type::Model(model) => model
            .properties
            .iter()
            .map(|&(atom, ty)| (program.name_text(atom).to_string(), ty))
            .collect(),
        other => panic!("'{}' is a {}, not a model", name, other.kind_name()),
    }
}

/// The `@blue` marker decorator: records each target in a state set.
static BLUE_KEY: Lazy<StateKey> = Lazy::new(next_state_key);

fn blue_module(counter: Arc<AtomicUsize>) -> ModuleExports {
    ModuleExports {
        entries: vec![(
            "$blue".to_string(),
            ExportValue::Decorator {
                implementation: Arc::new(move |context, target, _args| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    context.program.state_set(*BLUE_KEY).insert(target);
                    Ok(())
                }),
                namespace: None,
            },
        )],
    }
}

/// Walk a property's `source_property` chain looking for a state-set mark.
fn chain_has_mark(program: &mut Program, property: TypeId, key: StateKey) -> bool {
    let marked: FxHashSet<TypeId> = program.state_set(key).iter().copied().collect();
    let mut current = property;
    loop {
        if marked.contains(&current) {
            return true;
        }
        match program.types.get(current) {
            Type::ModelProperty(p) if p.source_property.is_some() => {
                current = p.source_property;
            }
            _ => return false,
        }
    }
}

// =============================================================================
// Spec scenarios
// =============================================================================

#[test]
fn spread_preserves_decorations() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut host = TestHost::new();
    host.add_module("/test/blue.js", blue_module(counter.clone()));
    host.add_file(
        "/test/main.cadl",
        r#"
        import "./blue.js";
        model A { @blue foo: string }
        model B { @blue bar: string }
        model C { ...A, ...B }
        "#,
    );
    let mut program = compile(
        Arc::new(host),
        Path::new("/test/main.cadl"),
        CompilerOptions {
            no_std_lib: true,
            no_emit: true,
            ..CompilerOptions::default()
        },
    );
    assert_no_diagnostics(&program);
    assert_eq!(counter.load(Ordering::SeqCst), 2);

    let properties = model_properties(&program, "C");
    assert_eq!(properties.len(), 2);
    for (name, property) in properties {
        assert!(
            chain_has_mark(&mut program, property, *BLUE_KEY),
            "property '{}' lost its decoration provenance",
            name
        );
    }
}

#[test]
fn using_namespace_in_global_scope() {
    let program = compile_files(&[
        (
            "/test/main.cadl",
            "import \"./a.cadl\";\nimport \"./b.cadl\";",
        ),
        ("/test/a.cadl", "namespace N;\nmodel X { x: int32 }"),
        ("/test/b.cadl", "using N;\nmodel Y { ...X }"),
    ]);
    assert_no_diagnostics(&program);
    let properties = model_properties(&program, "Y");
    assert_eq!(properties.len(), 1);
    assert_eq!(properties[0].0, "x");
}

#[test]
fn ambiguous_using_reported_at_use_site() {
    let program = compile_files(&[
        (
            "/test/main.cadl",
            "import \"./a.cadl\";\nimport \"./b.cadl\";\nimport \"./c.cadl\";",
        ),
        ("/test/a.cadl", "namespace N { model A {} }"),
        ("/test/b.cadl", "namespace M { model A {} }"),
        ("/test/c.cadl", "using N;\nusing M;\nmodel T { x: A }"),
    ]);
    assert!(program.has_error());
    let ambiguous: Vec<&Diagnostic> = program
        .diagnostics()
        .by_code(codes::AMBIGUOUS_REFERENCE)
        .collect();
    assert_eq!(ambiguous.len(), 1);
    // The diagnostic points at the use of `A`, not at the `using`.
    let span = ambiguous[0].target.span().unwrap();
    let file = ambiguous[0].target.file().unwrap();
    assert_eq!(program.file(file).source.slice(span), "A");
}

#[test]
fn duplicate_property_via_inheritance() {
    let program = compile_main("model A { x: int32 }\nmodel B extends A { x: int32 }");
    let matching: Vec<String> = error_messages(&program)
        .into_iter()
        .filter(|m| m.contains("inherited property"))
        .collect();
    assert_eq!(matching.len(), 1);
}

#[test]
fn self_recursive_base() {
    let program = compile_main("model A extends A {}");
    let errors = error_messages(&program);
    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors[0],
        "Model type 'A' recursively references itself as a base type."
    );
}

#[test]
fn default_type_mismatch() {
    let program = compile_main("model A { foo?: int32 = \"bar\" }");
    let errors = error_messages(&program);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("Default must be a number"));
}

#[test]
fn template_decorators_never_fire_uninstantiated() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut host = TestHost::new();
    host.add_module("/test/blue.js", blue_module(counter.clone()));
    host.add_file(
        "/test/main.cadl",
        "import \"./blue.js\";\n@blue model A<T> { @blue x: int32 }",
    );
    let program = compile(
        Arc::new(host),
        Path::new("/test/main.cadl"),
        CompilerOptions {
            no_std_lib: true,
            no_emit: true,
            ..CompilerOptions::default()
        },
    );
    assert_no_diagnostics(&program);
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[test]
fn recursive_template_is_terminates() {
    let program = compile_main(
        "model Box<T> { v: T; next: Self }\nmodel Self is Box<int32> {}",
    );
    assert_no_diagnostics(&program);
    let self_ty = program.global_member("Self").unwrap();
    let properties = model_properties(&program, "Self");
    assert_eq!(properties.len(), 2);
    let next = properties
        .iter()
        .find(|(name, _)| name == "next")
        .map(|&(_, p)| p)
        .unwrap();
    match program.types.get(next) {
        Type::ModelProperty(p) => assert_eq!(p.ty, self_ty),
        other => panic!("expected property, got {}", other.kind_name()),
    }
}

// =============================================================================
// Universal invariants
// =============================================================================

#[test]
fn literal_types_are_interned() {
    let program = compile_main("alias L1 = \"hello\";\nalias L2 = \"hello\";\nalias L3 = \"bye\";");
    assert_no_diagnostics(&program);
    let l1 = program.global_member("L1").unwrap();
    let l2 = program.global_member("L2").unwrap();
    let l3 = program.global_member("L3").unwrap();
    assert_eq!(l1, l2);
    assert_ne!(l1, l3);
}

#[test]
fn namespace_merging_across_files() {
    let program = compile_files(&[
        (
            "/test/main.cadl",
            "import \"./a.cadl\";\nimport \"./b.cadl\";",
        ),
        ("/test/a.cadl", "namespace N { model A {} }"),
        ("/test/b.cadl", "namespace N { model B {} }"),
    ]);
    assert_no_diagnostics(&program);
    // One merged namespace type whose members are the union of both sides.
    assert!(program.member_by_path("N.A").is_some());
    assert!(program.member_by_path("N.B").is_some());
}

#[test]
fn cross_file_member_collision_is_duplicate() {
    let program = compile_files(&[
        (
            "/test/main.cadl",
            "import \"./a.cadl\";\nimport \"./b.cadl\";",
        ),
        ("/test/a.cadl", "namespace N { model A {} }"),
        ("/test/b.cadl", "namespace N { model A {} }"),
    ]);
    assert_eq!(
        program.diagnostics().by_code(codes::DUPLICATE_SYMBOL).count(),
        1
    );
}

#[test]
fn template_instantiation_is_memoized() {
    let program = compile_main(
        "model Box<T> { v: T }\nalias One = Box<int32>;\nalias Two = Box<int32>;\nalias Other = Box<string>;",
    );
    assert_no_diagnostics(&program);
    let one = program.global_member("One").unwrap();
    let two = program.global_member("Two").unwrap();
    let other = program.global_member("Other").unwrap();
    assert_eq!(one, two);
    assert_ne!(one, other);
}

#[test]
fn suppress_drops_warnings_but_never_errors() {
    const CUSTOM: &str = "custom-lint";
    let mut program = compile_main("#suppress \"custom-lint\" \"known\"\nmodel A { x: int32 }");
    assert_no_diagnostics(&program);

    let root = program.file(FileId(0)).root;
    let model = match &program.file(FileId(0)).arena.get(root).kind {
        NodeKind::Script { statements } => statements[0],
        _ => unreachable!(),
    };

    // A warning of the suppressed code targeting the node is dropped.
    program.report(Diagnostic::warning(
        CUSTOM,
        "lint finding",
        DiagnosticTarget::Node {
            file: FileId(0),
            node: model,
            span: Span::default(),
        },
    ));
    assert_eq!(program.diagnostics().by_code(CUSTOM).count(), 0);

    // An error of the same code still fires, plus exactly one
    // cannot-suppress meta-diagnostic.
    program.report(Diagnostic::error(
        CUSTOM,
        "hard failure",
        DiagnosticTarget::Node {
            file: FileId(0),
            node: model,
            span: Span::default(),
        },
    ));
    assert_eq!(program.diagnostics().by_code(CUSTOM).count(), 1);
    assert_eq!(
        program.diagnostics().by_code(codes::SUPPRESS_ERROR).count(),
        1
    );
    assert!(program.has_error());
}

// =============================================================================
// Type graph shape
// =============================================================================

#[test]
fn petstore_type_graph() {
    let program = compile_files(&[(
        "/test/main.cadl",
        r#"
        namespace PetStore;

        enum Kind { Dog: "dog", Cat: "cat" }

        model Pet {
          name: string;
          kind: Kind;
          age?: int32 = 1;
          tags: string[];
        }

        model Error { code: int32; message: string }

        union PetOrError { pet: Pet, error: Error }

        interface Reads {
          read(id: string): Pet;
        }

        interface Pets mixes Reads {
          list(): Pet[];
        }

        op remove(id: string): Pet | Error;
        "#,
    )]);
    assert_no_diagnostics(&program);

    let pet = program.member_by_path("PetStore.Pet").unwrap();
    match program.types.get(pet) {
        Type::Model(model) => assert_eq!(model.properties.len(), 4),
        other => panic!("expected model, got {}", other.kind_name()),
    }

    let kind = program.member_by_path("PetStore.Kind").unwrap();
    match program.types.get(kind) {
        Type::Enum(e) => {
            assert_eq!(e.members.len(), 2);
            let dog = e.members[0].1;
            match program.types.get(dog) {
                Type::EnumMember(member) => {
                    assert_eq!(member.value, Some(EnumValue::Str("dog".to_string())));
                }
                other => panic!("expected enum member, got {}", other.kind_name()),
            }
        }
        other => panic!("expected enum, got {}", other.kind_name()),
    }

    let pets = program.member_by_path("PetStore.Pets").unwrap();
    match program.types.get(pets) {
        Type::Interface(interface) => {
            // `read` mixed in from Reads, plus its own `list`.
            assert_eq!(interface.operations.len(), 2);
            assert_eq!(interface.mixes.len(), 1);
        }
        other => panic!("expected interface, got {}", other.kind_name()),
    }

    let remove = program.member_by_path("PetStore.remove").unwrap();
    match program.types.get(remove) {
        Type::Operation(op) => {
            match program.types.get(op.parameters) {
                Type::Model(params) => assert_eq!(params.properties.len(), 1),
                other => panic!("expected parameters model, got {}", other.kind_name()),
            }
            match program.types.get(op.return_type) {
                Type::Union(union) => assert_eq!(union.options.len(), 2),
                other => panic!("expected union return, got {}", other.kind_name()),
            }
        }
        other => panic!("expected operation, got {}", other.kind_name()),
    }

    let union = program.member_by_path("PetStore.PetOrError").unwrap();
    match program.types.get(union) {
        Type::Union(u) => {
            assert_eq!(u.variants.len(), 2);
            assert_eq!(u.options.len(), 2);
        }
        other => panic!("expected union, got {}", other.kind_name()),
    }
}

#[test]
fn intersection_builds_anonymous_model() {
    let program = compile_main(
        "model A { a: string }\nmodel B { b: int32 }\nalias AB = A & B;",
    );
    assert_no_diagnostics(&program);
    let ab = program.global_member("AB").unwrap();
    match program.types.get(ab) {
        Type::Model(model) => {
            assert_eq!(model.properties.len(), 2);
            assert!(model.name.is_none());
        }
        other => panic!("expected model, got {}", other.kind_name()),
    }
}

#[test]
fn union_expression_dedupes_options() {
    let program = compile_main("alias U = string | string | int32;");
    assert_no_diagnostics(&program);
    let u = program.global_member("U").unwrap();
    match program.types.get(u) {
        Type::Union(union) => assert_eq!(union.options.len(), 2),
        other => panic!("expected union, got {}", other.kind_name()),
    }
}

#[test]
fn is_composition_applies_base_decorators_to_new_identity() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut host = TestHost::new();
    host.add_module("/test/blue.js", blue_module(counter.clone()));
    host.add_file(
        "/test/main.cadl",
        "import \"./blue.js\";\n@blue model Base { x: string }\nmodel Derived is Base {}",
    );
    let mut program = compile(
        Arc::new(host),
        Path::new("/test/main.cadl"),
        CompilerOptions {
            no_std_lib: true,
            no_emit: true,
            ..CompilerOptions::default()
        },
    );
    assert_no_diagnostics(&program);
    // Once for Base, once re-applied to Derived's identity.
    assert_eq!(counter.load(Ordering::SeqCst), 2);
    let base = program.global_member("Base").unwrap();
    let derived = program.global_member("Derived").unwrap();
    let marked: Vec<TypeId> = program.state_set(*BLUE_KEY).iter().copied().collect();
    assert!(marked.contains(&base));
    assert!(marked.contains(&derived));
}

#[test]
fn decorator_arguments_evaluate() {
    let seen: Arc<std::sync::Mutex<Vec<DecoratorArgValue>>> =
        Arc::new(std::sync::Mutex::new(Vec::new()));
    let seen_in = seen.clone();
    let mut host = TestHost::new();
    host.add_module(
        "/test/doc.js",
        ModuleExports {
            entries: vec![(
                "$doc".to_string(),
                ExportValue::Decorator {
                    implementation: Arc::new(move |_context, _target, args| {
                        seen_in.lock().unwrap().extend(args.iter().cloned());
                        Ok(())
                    }),
                    namespace: None,
                },
            )],
        },
    );
    host.add_file(
        "/test/main.cadl",
        "import \"./doc.js\";\nmodel Other {}\n@doc(\"hi\", 4, true, Other) model A {}",
    );
    let program = compile(
        Arc::new(host),
        Path::new("/test/main.cadl"),
        CompilerOptions {
            no_std_lib: true,
            no_emit: true,
            ..CompilerOptions::default()
        },
    );
    assert_no_diagnostics(&program);
    let other = program.global_member("Other").unwrap();
    let args = seen.lock().unwrap().clone();
    assert_eq!(
        args,
        vec![
            DecoratorArgValue::Str("hi".to_string()),
            DecoratorArgValue::Num(4.0),
            DecoratorArgValue::Bool(true),
            DecoratorArgValue::Type(other),
        ]
    );
}

#[test]
fn failing_decorator_aborts_declaration_but_not_program() {
    let mut host = TestHost::new();
    host.add_module(
        "/test/bad.js",
        ModuleExports {
            entries: vec![(
                "$bad".to_string(),
                ExportValue::Decorator {
                    implementation: Arc::new(|_context, _target, _args| {
                        Err("boom".to_string())
                    }),
                    namespace: None,
                },
            )],
        },
    );
    host.add_file(
        "/test/main.cadl",
        "import \"./bad.js\";\n@bad model A {}\nmodel B { x: string }",
    );
    let program = compile(
        Arc::new(host),
        Path::new("/test/main.cadl"),
        CompilerOptions {
            no_std_lib: true,
            no_emit: true,
            ..CompilerOptions::default()
        },
    );
    let fails: Vec<&Diagnostic> = program.diagnostics().by_code(codes::DECORATOR_FAIL).collect();
    assert_eq!(fails.len(), 1);
    assert!(fails[0].message.contains("@bad"));
    // Other declarations are still checked.
    assert_eq!(model_properties(&program, "B").len(), 1);
}

#[test]
fn decorator_bound_into_module_namespace() {
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_in = hits.clone();
    let mut host = TestHost::new();
    host.add_module(
        "/test/lib.js",
        ModuleExports {
            entries: vec![
                (
                    "namespace".to_string(),
                    ExportValue::Str("My.Lib".to_string()),
                ),
                (
                    "$tag".to_string(),
                    ExportValue::Decorator {
                        implementation: Arc::new(move |_context, _target, _args| {
                            hits_in.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        }),
                        namespace: None,
                    },
                ),
            ],
        },
    );
    host.add_file(
        "/test/main.cadl",
        "import \"./lib.js\";\n@My.Lib.tag model A {}\nusing My.Lib;\n@tag model B {}",
    );
    let program = compile(
        Arc::new(host),
        Path::new("/test/main.cadl"),
        CompilerOptions {
            no_std_lib: true,
            no_emit: true,
            ..CompilerOptions::default()
        },
    );
    assert_no_diagnostics(&program);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[test]
fn on_validate_and_on_emit_run() {
    let validated = Arc::new(AtomicUsize::new(0));
    let emitted = Arc::new(AtomicUsize::new(0));
    let validated_in = validated.clone();
    let emitted_in = emitted.clone();
    let mut host = TestHost::new();
    host.add_module(
        "/test/lib.js",
        ModuleExports {
            entries: vec![
                (
                    "$onValidate".to_string(),
                    ExportValue::Callback(Arc::new(move |_program| {
                        validated_in.fetch_add(1, Ordering::SeqCst);
                    })),
                ),
                (
                    "$onEmit".to_string(),
                    ExportValue::Callback(Arc::new(move |_program| {
                        emitted_in.fetch_add(1, Ordering::SeqCst);
                    })),
                ),
            ],
        },
    );
    host.add_file("/test/main.cadl", "import \"./lib.js\";\nmodel A {}");
    let program = compile(
        Arc::new(host),
        Path::new("/test/main.cadl"),
        CompilerOptions {
            no_std_lib: true,
            no_emit: false,
            ..CompilerOptions::default()
        },
    );
    assert_no_diagnostics(&program);
    assert_eq!(validated.load(Ordering::SeqCst), 1);
    assert_eq!(emitted.load(Ordering::SeqCst), 1);
}

// =============================================================================
// Loader behavior
// =============================================================================

#[test]
fn imports_resolve_through_package_descriptor() {
    let program = compile_files(&[
        ("/test/main.cadl", "import \"pets\";\nmodel Mine { p: Pet }"),
        (
            "/test/node_modules/pets/package.json",
            "{\"name\": \"pets\", \"cadlMain\": \"lib/pets.cadl\", \"main\": \"dist/index.js\"}",
        ),
        (
            "/test/node_modules/pets/lib/pets.cadl",
            "model Pet { name: string }",
        ),
    ]);
    assert_no_diagnostics(&program);
    assert_eq!(model_properties(&program, "Mine").len(), 1);
}

#[test]
fn missing_import_is_reported() {
    let program = compile_main("import \"./nope.cadl\";");
    assert_eq!(
        program.diagnostics().by_code(codes::FILE_NOT_FOUND).count(),
        1
    );
}

#[test]
fn missing_library_is_reported() {
    let program = compile_main("import \"no-such-lib\";");
    assert_eq!(
        program
            .diagnostics()
            .by_code(codes::LIBRARY_NOT_FOUND)
            .count(),
        1
    );
}

#[test]
fn unknown_extension_is_invalid_import() {
    let program = compile_files(&[
        ("/test/main.cadl", "import \"./data.yaml\";"),
        ("/test/data.yaml", "key: value"),
    ]);
    assert_eq!(
        program.diagnostics().by_code(codes::INVALID_IMPORT).count(),
        1
    );
}

#[test]
fn files_load_once_across_diamond_imports() {
    let program = compile_files(&[
        (
            "/test/main.cadl",
            "import \"./a.cadl\";\nimport \"./b.cadl\";",
        ),
        ("/test/a.cadl", "import \"./shared.cadl\";\nmodel A { s: S }"),
        ("/test/b.cadl", "import \"./shared.cadl\";\nmodel B { s: S }"),
        ("/test/shared.cadl", "model S { v: int32 }"),
    ]);
    assert_no_diagnostics(&program);
    assert_eq!(program.file_count(), 4);
}

#[test]
fn std_lib_loads_before_user_code() {
    let mut host = TestHost::new();
    host.lib_dirs.push(PathBuf::from("/lib/std"));
    host.add_file(
        "/lib/std/package.json",
        "{\"name\": \"std\", \"cadlMain\": \"main.cadl\"}",
    );
    host.add_file("/lib/std/main.cadl", "model StdThing { v: string }");
    host.add_file("/test/main.cadl", "model Mine { t: StdThing }");
    let program = compile(
        Arc::new(host),
        Path::new("/test/main.cadl"),
        CompilerOptions {
            no_std_lib: false,
            no_emit: true,
            ..CompilerOptions::default()
        },
    );
    assert_no_diagnostics(&program);
    // Library file first, then user code.
    assert_eq!(
        program.file(FileId(0)).source.path(),
        "/lib/std/main.cadl"
    );
}

#[test]
fn compiler_version_mismatch_aborts() {
    let mut host = TestHost::new();
    host.add_file(
        "/test/node_modules/@cadl-lang/compiler/package.json",
        "{\"name\": \"@cadl-lang/compiler\", \"main\": \"dist/index.js\"}",
    );
    host.add_file("/test/main.cadl", "model A {}");
    let program = compile(
        Arc::new(host),
        Path::new("/test/main.cadl"),
        CompilerOptions {
            no_std_lib: true,
            no_emit: true,
            compiler_path: Some(PathBuf::from("/usr/global/cadlc")),
            ..CompilerOptions::default()
        },
    );
    assert_eq!(
        program
            .diagnostics()
            .by_code(codes::COMPILER_VERSION_MISMATCH)
            .count(),
        1
    );
    // Fatal: nothing was loaded.
    assert_eq!(program.file_count(), 0);
}

#[test]
fn cancellation_preserves_diagnostics() {
    struct CancellingHost {
        inner: TestHost,
    }
    impl CompilerHost for CancellingHost {
        fn read_file(&self, path: &Path) -> Result<SourceText, HostError> {
            if path.to_string_lossy().contains("second") {
                Err(HostError::Cancelled)
            } else {
                self.inner.read_file(path)
            }
        }
        fn stat(&self, path: &Path) -> Result<FileStat, HostError> {
            self.inner.stat(path)
        }
        fn realpath(&self, path: &Path) -> Result<PathBuf, HostError> {
            self.inner.realpath(path)
        }
        fn get_external_module_exports(&self, path: &Path) -> Result<ModuleExports, HostError> {
            self.inner.get_external_module_exports(path)
        }
        fn get_lib_dirs(&self) -> Vec<PathBuf> {
            self.inner.get_lib_dirs()
        }
        fn write_file(&self, path: &Path, content: &str) -> Result<(), HostError> {
            self.inner.write_file(path, content)
        }
        fn resolve_absolute_path(&self, path: &Path) -> PathBuf {
            self.inner.resolve_absolute_path(path)
        }
    }

    let mut inner = TestHost::new();
    inner.add_file(
        "/test/main.cadl",
        "import \"./second.cadl\";\nmodel A extends A {}",
    );
    inner.add_file("/test/second.cadl", "model B {}");
    let program = compile(
        Arc::new(CancellingHost { inner }),
        Path::new("/test/main.cadl"),
        CompilerOptions {
            no_std_lib: true,
            no_emit: true,
            ..CompilerOptions::default()
        },
    );
    // Compilation aborted before checking: the parse happened, the checker
    // never ran, and no partial type graph exists.
    assert!(program.global_member("A").is_none());
}

// =============================================================================
// Real filesystem host
// =============================================================================

#[test]
fn real_host_compiles_from_disk() {
    use cadlc::program::host::RealHost;

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("main.cadl"),
        "import \"./pet.cadl\";\nmodel Shelter { pets: Pet[] }",
    )
    .unwrap();
    std::fs::write(dir.path().join("pet.cadl"), "model Pet { name: string }").unwrap();

    let program = compile(
        Arc::new(RealHost::new()),
        &dir.path().join("main.cadl"),
        CompilerOptions {
            no_std_lib: true,
            no_emit: true,
            ..CompilerOptions::default()
        },
    );
    assert_no_diagnostics(&program);
    assert_eq!(program.file_count(), 2);
    assert_eq!(model_properties(&program, "Shelter").len(), 1);
}

// =============================================================================
// Node/symbol invariants
// =============================================================================

#[test]
fn declaration_nodes_have_symbols() {
    let program = compile_main("model A {}\nnamespace N { op go(): A; }");
    assert_no_diagnostics(&program);
    let file = FileId(0);
    let bindings = &program.bindings[0];
    let root = program.file(file).root;
    let statements = match &program.file(file).arena.get(root).kind {
        NodeKind::Script { statements } => statements.clone(),
        _ => unreachable!(),
    };
    for statement in statements {
        let node = program.file(file).arena.get(statement);
        if node.kind.is_declaration() {
            let symbol = bindings.node_symbols.get(&statement.0).copied();
            assert!(symbol.is_some(), "{} has no symbol", node.kind.name());
            // The symbol points back at its declaration node.
            let symbol = program.symbols.get(symbol.unwrap());
            assert_eq!(symbol.node, NodeRef::new(file, statement));
        }
    }
}
