//! Per-language grammar selection and the entity/import queries spec.md
//! §4.8 requires one of each for. Grounded on the teacher corpus's
//! tree-sitter query style: one query per symbol kind, captures named
//! `name`/`def`, signatures derived from the `def` capture's first line.

use tree_sitter::Language;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lang {
    Python,
    TypeScript,
    Tsx,
    JavaScript,
    Go,
    Rust,
    Java,
    Ruby,
    Php,
    C,
    Cpp,
    CSharp,
}

impl Lang {
    pub fn name(&self) -> &'static str {
        match self {
            Lang::Python => "python",
            Lang::TypeScript => "typescript",
            Lang::Tsx => "tsx",
            Lang::JavaScript => "javascript",
            Lang::Go => "go",
            Lang::Rust => "rust",
            Lang::Java => "java",
            Lang::Ruby => "ruby",
            Lang::Php => "php",
            Lang::C => "c",
            Lang::Cpp => "cpp",
            Lang::CSharp => "csharp",
        }
    }
}

/// One query per entity kind plus one import query. `capture` names the
/// capture holding the node whose first line becomes the signature; `name`
/// always names the capture holding the symbol's identifier.
pub struct EntityQuery {
    pub kind: &'static str,
    pub source: &'static str,
}

pub struct LanguageSpec {
    pub lang: Lang,
    pub extensions: &'static [&'static str],
    pub entity_queries: &'static [EntityQuery],
    pub import_query: Option<&'static str>,
    pub class_like_kinds: &'static [&'static str],
}

pub fn grammar(lang: Lang) -> Option<Language> {
    match lang {
        #[cfg(feature = "lang-python")]
        Lang::Python => Some(tree_sitter_python::language()),
        #[cfg(feature = "lang-typescript")]
        Lang::TypeScript => Some(tree_sitter_typescript::language_typescript()),
        #[cfg(feature = "lang-typescript")]
        Lang::Tsx => Some(tree_sitter_typescript::language_tsx()),
        #[cfg(feature = "lang-javascript")]
        Lang::JavaScript => Some(tree_sitter_javascript::language()),
        #[cfg(feature = "lang-go")]
        Lang::Go => Some(tree_sitter_go::language()),
        #[cfg(feature = "lang-rust")]
        Lang::Rust => Some(tree_sitter_rust::language()),
        #[cfg(feature = "lang-java")]
        Lang::Java => Some(tree_sitter_java::language()),
        #[cfg(feature = "lang-ruby")]
        Lang::Ruby => Some(tree_sitter_ruby::language()),
        #[cfg(feature = "lang-php")]
        Lang::Php => Some(tree_sitter_php::language_php()),
        #[cfg(feature = "lang-c")]
        Lang::C => Some(tree_sitter_c::language()),
        #[cfg(feature = "lang-cpp")]
        Lang::Cpp => Some(tree_sitter_cpp::language()),
        #[cfg(feature = "lang-csharp")]
        Lang::CSharp => Some(tree_sitter_c_sharp::language()),
        #[allow(unreachable_patterns)]
        _ => None,
    }
}

pub fn pick_language(extension: &str) -> Option<Lang> {
    ALL_SPECS
        .iter()
        .find(|spec| spec.extensions.contains(&extension))
        .map(|spec| spec.lang)
}

pub fn spec_for(lang: Lang) -> &'static LanguageSpec {
    ALL_SPECS
        .iter()
        .find(|spec| spec.lang == lang)
        .expect("every Lang variant has a LanguageSpec")
}

pub static ALL_SPECS: &[LanguageSpec] = &[
    LanguageSpec {
        lang: Lang::Rust,
        extensions: &["rs"],
        entity_queries: &[
            EntityQuery { kind: "function", source: "(function_item name: (identifier) @name) @def" },
            EntityQuery { kind: "method", source: "(impl_item body: (declaration_list (function_item name: (identifier) @name) @def))" },
            EntityQuery { kind: "class", source: "(struct_item name: (type_identifier) @name) @def" },
            EntityQuery { kind: "class", source: "(enum_item name: (type_identifier) @name) @def" },
            EntityQuery { kind: "class", source: "(trait_item name: (type_identifier) @name) @def" },
        ],
        import_query: Some("(use_declaration argument: (_) @path)"),
        class_like_kinds: &["struct_item", "enum_item", "trait_item", "impl_item"],
    },
    LanguageSpec {
        lang: Lang::Python,
        extensions: &["py"],
        entity_queries: &[
            EntityQuery { kind: "function", source: "(function_definition name: (identifier) @name) @def" },
            EntityQuery { kind: "class", source: "(class_definition name: (identifier) @name) @def" },
        ],
        import_query: Some("(import_statement) @path (import_from_statement) @path"),
        class_like_kinds: &["class_definition"],
    },
    LanguageSpec {
        lang: Lang::TypeScript,
        extensions: &["ts", "mts", "cts"],
        entity_queries: &[
            EntityQuery { kind: "function", source: "(function_declaration name: (identifier) @name) @def" },
            EntityQuery { kind: "function", source: "(lexical_declaration (variable_declarator name: (identifier) @name value: (arrow_function))) @def" },
            EntityQuery { kind: "class", source: "(class_declaration name: (type_identifier) @name) @def" },
            EntityQuery { kind: "method", source: "(method_definition name: (property_identifier) @name) @def" },
        ],
        import_query: Some("(import_statement source: (string) @path)"),
        class_like_kinds: &["class_declaration", "interface_declaration"],
    },
    LanguageSpec {
        lang: Lang::Tsx,
        extensions: &["tsx"],
        entity_queries: &[
            EntityQuery { kind: "function", source: "(function_declaration name: (identifier) @name) @def" },
            EntityQuery { kind: "class", source: "(class_declaration name: (type_identifier) @name) @def" },
            EntityQuery { kind: "method", source: "(method_definition name: (property_identifier) @name) @def" },
        ],
        import_query: Some("(import_statement source: (string) @path)"),
        class_like_kinds: &["class_declaration", "interface_declaration"],
    },
    LanguageSpec {
        lang: Lang::JavaScript,
        extensions: &["js", "jsx", "mjs", "cjs"],
        entity_queries: &[
            EntityQuery { kind: "function", source: "(function_declaration name: (identifier) @name) @def" },
            EntityQuery { kind: "function", source: "(lexical_declaration (variable_declarator name: (identifier) @name value: (arrow_function))) @def" },
            EntityQuery { kind: "class", source: "(class_declaration name: (identifier) @name) @def" },
            EntityQuery { kind: "method", source: "(method_definition name: (property_identifier) @name) @def" },
        ],
        import_query: Some("(import_statement source: (string) @path)"),
        class_like_kinds: &["class_declaration"],
    },
    LanguageSpec {
        lang: Lang::Go,
        extensions: &["go"],
        entity_queries: &[
            EntityQuery { kind: "function", source: "(function_declaration name: (identifier) @name) @def" },
            EntityQuery { kind: "method", source: "(method_declaration name: (field_identifier) @name) @def" },
            EntityQuery { kind: "class", source: "(type_declaration (type_spec name: (type_identifier) @name type: (struct_type))) @def" },
        ],
        import_query: Some("(import_spec path: (interpreted_string_literal) @path)"),
        class_like_kinds: &["type_spec"],
    },
    LanguageSpec {
        lang: Lang::Java,
        extensions: &["java"],
        entity_queries: &[
            EntityQuery { kind: "method", source: "(method_declaration name: (identifier) @name) @def" },
            EntityQuery { kind: "class", source: "(class_declaration name: (identifier) @name) @def" },
            EntityQuery { kind: "class", source: "(interface_declaration name: (identifier) @name) @def" },
        ],
        import_query: Some("(import_declaration (scoped_identifier) @path)"),
        class_like_kinds: &["class_declaration", "interface_declaration"],
    },
    LanguageSpec {
        lang: Lang::Ruby,
        extensions: &["rb"],
        entity_queries: &[
            EntityQuery { kind: "method", source: "(method name: (identifier) @name) @def" },
            EntityQuery { kind: "class", source: "(class name: (constant) @name) @def" },
            EntityQuery { kind: "class", source: "(module name: (constant) @name) @def" },
        ],
        import_query: Some("(call method: (identifier) @method arguments: (argument_list (string) @path) (#eq? @method \"require\"))"),
        class_like_kinds: &["class", "module"],
    },
    LanguageSpec {
        lang: Lang::Php,
        extensions: &["php"],
        entity_queries: &[
            EntityQuery { kind: "function", source: "(function_definition name: (name) @name) @def" },
            EntityQuery { kind: "method", source: "(method_declaration name: (name) @name) @def" },
            EntityQuery { kind: "class", source: "(class_declaration name: (name) @name) @def" },
        ],
        import_query: Some("(namespace_use_declaration (namespace_use_clause (qualified_name) @path))"),
        class_like_kinds: &["class_declaration", "interface_declaration"],
    },
    LanguageSpec {
        lang: Lang::C,
        extensions: &["c", "h"],
        entity_queries: &[
            EntityQuery { kind: "function", source: "(function_definition declarator: (function_declarator declarator: (identifier) @name)) @def" },
        ],
        import_query: Some("(preproc_include path: (_) @path)"),
        class_like_kinds: &["struct_specifier"],
    },
    LanguageSpec {
        lang: Lang::Cpp,
        extensions: &["cpp", "cc", "cxx", "hpp", "hh"],
        entity_queries: &[
            EntityQuery { kind: "function", source: "(function_definition declarator: (function_declarator declarator: (identifier) @name)) @def" },
            EntityQuery { kind: "class", source: "(class_specifier name: (type_identifier) @name) @def" },
        ],
        import_query: Some("(preproc_include path: (_) @path)"),
        class_like_kinds: &["class_specifier", "struct_specifier"],
    },
    LanguageSpec {
        lang: Lang::CSharp,
        extensions: &["cs"],
        entity_queries: &[
            EntityQuery { kind: "method", source: "(method_declaration name: (identifier) @name) @def" },
            EntityQuery { kind: "class", source: "(class_declaration name: (identifier) @name) @def" },
            EntityQuery { kind: "class", source: "(interface_declaration name: (identifier) @name) @def" },
        ],
        import_query: Some("(using_directive (qualified_name) @path)"),
        class_like_kinds: &["class_declaration", "interface_declaration"],
    },
];

pub fn default_exclude_dirs() -> Vec<String> {
    [
        ".git", "node_modules", "__pycache__", ".venv", "venv", "dist", "build", "target",
        ".idea", ".vscode",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
