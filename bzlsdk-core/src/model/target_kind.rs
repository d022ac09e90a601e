use std::collections::HashMap;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TargetKind {
    pub name: String,
    pub runnable: bool,
    pub testable: bool,
}

impl TargetKind {
    pub fn is_launchable(&self) -> bool {
        self.runnable || self.testable
    }
}

/// Rule kinds we know how to launch, looked up case-insensitively.
#[derive(Clone, Debug)]
pub struct TargetKindRegistry {
    kinds: HashMap<String, TargetKind>,
}

const SEEDED_KINDS: &[(&str, bool, bool)] = &[
    ("java_library", false, false),
    ("java_import", false, false),
    ("java_binary", true, false),
    ("java_test", false, true),
    ("java_web_test_suite", false, true),
    ("java_proto_library", false, false),
    ("java_lite_proto_library", false, false),
    ("java_grpc_library", false, false),
    ("springboot", true, false),
    ("scala_library", false, false),
    ("scala_binary", true, false),
    ("scala_test", false, true),
    ("kt_jvm_library", false, false),
    ("kt_jvm_binary", true, false),
    ("kt_jvm_test", false, true),
    ("py_library", false, false),
    ("py_binary", true, false),
    ("py_test", false, true),
    ("go_library", false, false),
    ("go_binary", true, false),
    ("go_test", false, true),
    ("cc_library", false, false),
    ("cc_binary", true, false),
    ("cc_test", false, true),
    ("sh_library", false, false),
    ("sh_binary", true, false),
    ("sh_test", false, true),
];

impl Default for TargetKindRegistry {
    fn default() -> Self {
        let mut registry = TargetKindRegistry {
            kinds: HashMap::default(),
        };
        for (name, runnable, testable) in SEEDED_KINDS {
            registry.register(name, *runnable, *testable);
        }
        registry
    }
}

impl TargetKindRegistry {
    pub fn register(&mut self, kind: &str, runnable: bool, testable: bool) {
        self.kinds.insert(
            kind.to_lowercase(),
            TargetKind {
                name: kind.to_string(),
                runnable,
                testable,
            },
        );
    }

    pub fn get(&self, kind: &str) -> Option<&TargetKind> {
        self.kinds.get(&kind.trim().to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}
