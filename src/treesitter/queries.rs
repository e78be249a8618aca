//! Per-language tree-sitter queries, compiled once and cached by
//! [`super::Bridge`].
//!
//! These cover the baseline natively-linked grammars only (see module-level
//! docs on why WASM grammar loading is out of scope for this build). Queries
//! are intentionally narrow: enough capture names to exercise every `ts_*`
//! operation, not an exhaustive highlight palette.

pub struct LanguageQueries {
    pub symbols: &'static str,
    pub folds: &'static str,
    pub objects: &'static str,
    pub highlights: &'static str,
}

pub fn for_language(language_id: &str) -> Option<LanguageQueries> {
    Some(match language_id {
        "rust" => LanguageQueries {
            symbols: RUST_SYMBOLS,
            folds: RUST_FOLDS,
            objects: RUST_OBJECTS,
            highlights: RUST_HIGHLIGHTS,
        },
        "python" => LanguageQueries {
            symbols: PYTHON_SYMBOLS,
            folds: PYTHON_FOLDS,
            objects: PYTHON_OBJECTS,
            highlights: PYTHON_HIGHLIGHTS,
        },
        "javascript" | "javascriptreact" => LanguageQueries {
            symbols: JS_SYMBOLS,
            folds: JS_FOLDS,
            objects: JS_OBJECTS,
            highlights: JS_HIGHLIGHTS,
        },
        "typescript" | "typescriptreact" => LanguageQueries {
            symbols: TS_SYMBOLS,
            folds: TS_FOLDS,
            objects: TS_OBJECTS,
            highlights: TS_HIGHLIGHTS,
        },
        "go" => LanguageQueries {
            symbols: GO_SYMBOLS,
            folds: GO_FOLDS,
            objects: GO_OBJECTS,
            highlights: GO_HIGHLIGHTS,
        },
        _ => return None,
    })
}

const RUST_SYMBOLS: &str = r#"
(function_item name: (identifier) @symbol.function)
(struct_item name: (type_identifier) @symbol.struct)
(enum_item name: (type_identifier) @symbol.enum)
(trait_item name: (type_identifier) @symbol.interface)
(impl_item type: (type_identifier) @symbol.class)
(mod_item name: (identifier) @symbol.module)
(const_item name: (identifier) @symbol.constant)
"#;
const RUST_FOLDS: &str = r#"
(block) @fold
(function_item body: (block) @fold)
(match_expression) @fold
(struct_item body: (field_declaration_list) @fold)
"#;
const RUST_OBJECTS: &str = r#"
(function_item body: (block) @object.function.inner) @object.function
(struct_item) @object.class
(impl_item) @object.class
"#;
const RUST_HIGHLIGHTS: &str = r#"
(identifier) @variable
(type_identifier) @type
(string_literal) @string
(integer_literal) @number
(line_comment) @comment
(block_comment) @comment
["fn" "let" "struct" "enum" "impl" "trait" "match" "pub" "use" "mod"] @keyword
(mutable_specifier) @keyword
"#;

const PYTHON_SYMBOLS: &str = r#"
(function_definition name: (identifier) @symbol.function)
(class_definition name: (identifier) @symbol.class)
"#;
const PYTHON_FOLDS: &str = r#"
(block) @fold
(function_definition body: (block) @fold)
(class_definition body: (block) @fold)
"#;
const PYTHON_OBJECTS: &str = r#"
(function_definition body: (block) @object.function.inner) @object.function
(class_definition) @object.class
"#;
const PYTHON_HIGHLIGHTS: &str = r#"
(identifier) @variable
(string) @string
(integer) @number
(comment) @comment
["def" "class" "return" "import" "from" "if" "else" "for" "while"] @keyword
"#;

const JS_SYMBOLS: &str = r#"
(function_declaration name: (identifier) @symbol.function)
(class_declaration name: (identifier) @symbol.class)
(method_definition name: (property_identifier) @symbol.method)
"#;
const JS_FOLDS: &str = r#"
(statement_block) @fold
(object) @fold
"#;
const JS_OBJECTS: &str = r#"
(function_declaration body: (statement_block) @object.function.inner) @object.function
(class_declaration) @object.class
"#;
const JS_HIGHLIGHTS: &str = r#"
(identifier) @variable
(string) @string
(number) @number
(comment) @comment
["function" "class" "return" "const" "let" "var" "if" "else"] @keyword
"#;

const TS_SYMBOLS: &str = r#"
(function_declaration name: (identifier) @symbol.function)
(class_declaration name: (type_identifier) @symbol.class)
(interface_declaration name: (type_identifier) @symbol.interface)
"#;
const TS_FOLDS: &str = r#"
(statement_block) @fold
(interface_body) @fold
"#;
const TS_OBJECTS: &str = r#"
(function_declaration body: (statement_block) @object.function.inner) @object.function
(class_declaration) @object.class
"#;
const TS_HIGHLIGHTS: &str = r#"
(identifier) @variable
(string) @string
(number) @number
(comment) @comment
["function" "class" "interface" "return" "const" "let" "var"] @keyword
"#;

const GO_SYMBOLS: &str = r#"
(function_declaration name: (identifier) @symbol.function)
(method_declaration name: (field_identifier) @symbol.method)
(type_declaration (type_spec name: (type_identifier) @symbol.struct))
"#;
const GO_FOLDS: &str = r#"
(block) @fold
"#;
const GO_OBJECTS: &str = r#"
(function_declaration body: (block) @object.function.inner) @object.function
"#;
const GO_HIGHLIGHTS: &str = r#"
(identifier) @variable
(interpreted_string_literal) @string
(int_literal) @number
(comment) @comment
["func" "type" "struct" "return" "if" "else" "for" "package" "import"] @keyword
"#;
