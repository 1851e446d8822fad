// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Grammar mapping: tree-sitter-java node kinds to production names,
//! categories, and parent slots.

use mendtool_core::frontend::{kinds, slots};
use mendtool_core::tree::Category;

/// Production name and category for a grammar node kind. `None` for kinds
/// that are skipped or flattened.
pub(crate) fn production(ts_kind: &str) -> Option<(&'static str, Category)> {
    use Category::*;
    let mapped = match ts_kind {
        "program" => (kinds::COMPILATION_UNIT, Unit),
        "package_declaration" => (kinds::PACKAGE_DECLARATION, Declaration),
        "import_declaration" => (kinds::IMPORT_DECLARATION, Declaration),
        "class_declaration" | "interface_declaration" => (kinds::TYPE_DECLARATION, Declaration),
        "enum_declaration" => ("EnumDeclaration", Declaration),
        "record_declaration" => ("RecordDeclaration", Declaration),
        "annotation_type_declaration" => ("AnnotationTypeDeclaration", Declaration),
        "field_declaration" | "constant_declaration" => ("FieldDeclaration", Declaration),
        "method_declaration" | "constructor_declaration" | "compact_constructor_declaration" => {
            (kinds::METHOD_DECLARATION, Declaration)
        }
        "static_initializer" => ("Initializer", Declaration),
        "enum_constant" => ("EnumConstantDeclaration", Declaration),
        "variable_declarator" => ("VariableDeclarationFragment", Other),
        "formal_parameter" | "spread_parameter" | "catch_formal_parameter" => {
            ("SingleVariableDeclaration", Other)
        }
        "local_variable_declaration" => ("VariableDeclarationStatement", Statement),
        "block" | "constructor_body" => (kinds::BLOCK, Statement),
        "if_statement" => (kinds::IF_STATEMENT, Statement),
        "while_statement" => ("WhileStatement", Statement),
        "do_statement" => ("DoStatement", Statement),
        "for_statement" => ("ForStatement", Statement),
        "enhanced_for_statement" => ("EnhancedForStatement", Statement),
        "return_statement" => ("ReturnStatement", Statement),
        "throw_statement" => ("ThrowStatement", Statement),
        "break_statement" => ("BreakStatement", Statement),
        "continue_statement" => ("ContinueStatement", Statement),
        "try_statement" | "try_with_resources_statement" => ("TryStatement", Statement),
        "catch_clause" => ("CatchClause", Other),
        "switch_expression" => ("SwitchStatement", Statement),
        "switch_block_statement_group" | "switch_rule" => ("SwitchCase", Statement),
        "switch_label" => ("SwitchLabel", Other),
        "synchronized_statement" => ("SynchronizedStatement", Statement),
        "labeled_statement" => ("LabeledStatement", Statement),
        "assert_statement" => ("AssertStatement", Statement),
        "yield_statement" => ("YieldStatement", Statement),
        "explicit_constructor_invocation" => ("ConstructorInvocation", Statement),
        "local_class_declaration" => ("TypeDeclarationStatement", Statement),
        "resource" => ("Resource", Other),
        "binary_expression" => (kinds::INFIX_EXPRESSION, Expression),
        "unary_expression" => (kinds::PREFIX_EXPRESSION, Expression),
        "update_expression" => (kinds::POSTFIX_EXPRESSION, Expression),
        "assignment_expression" => ("Assignment", Expression),
        "method_invocation" => (kinds::METHOD_INVOCATION, Expression),
        "field_access" => ("FieldAccess", Expression),
        "object_creation_expression" => ("ClassInstanceCreation", Expression),
        "array_creation_expression" => ("ArrayCreation", Expression),
        "array_initializer" => ("ArrayInitializer", Expression),
        "array_access" => ("ArrayAccess", Expression),
        "cast_expression" => ("CastExpression", Expression),
        "ternary_expression" => ("ConditionalExpression", Expression),
        "instanceof_expression" => ("InstanceofExpression", Expression),
        "parenthesized_expression" => ("ParenthesizedExpression", Expression),
        "lambda_expression" => ("LambdaExpression", Expression),
        "method_reference" => ("MethodReference", Expression),
        "this" => ("ThisExpression", Expression),
        "super" => ("SuperExpression", Expression),
        "class_literal" => ("TypeLiteral", Expression),
        "identifier" => (kinds::SIMPLE_NAME, Name),
        "scoped_identifier" => ("QualifiedName", Name),
        "type_identifier" => ("SimpleType", Type),
        "scoped_type_identifier" => ("QualifiedType", Type),
        "generic_type" => ("ParameterizedType", Type),
        "array_type" => ("ArrayType", Type),
        "catch_type" => ("UnionType", Type),
        "integral_type" | "floating_point_type" | "boolean_type" | "void_type" => {
            ("PrimitiveType", Type)
        }
        "decimal_integer_literal"
        | "hex_integer_literal"
        | "octal_integer_literal"
        | "binary_integer_literal"
        | "decimal_floating_point_literal"
        | "hex_floating_point_literal" => ("NumberLiteral", Literal),
        "string_literal" | "text_block" => ("StringLiteral", Literal),
        "character_literal" => ("CharacterLiteral", Literal),
        "true" | "false" => ("BooleanLiteral", Literal),
        "null_literal" => ("NullLiteral", Literal),
        _ => return None,
    };
    Some(mapped)
}

/// Kinds dropped from the tree with their whole subtree.
pub(crate) fn is_skipped(ts_kind: &str) -> bool {
    matches!(
        ts_kind,
        "line_comment"
            | "block_comment"
            | "modifiers"
            | "marker_annotation"
            | "annotation"
            | "type_parameters"
            | "type_arguments"
            | "dimensions"
            | "asterisk"
            | "throws"
    )
}

/// Wrapper kinds whose children are lifted into the parent under a fixed
/// slot: `(slot name, list)`.
pub(crate) fn flattened(ts_kind: &str) -> Option<(&'static str, bool)> {
    let slot = match ts_kind {
        "class_body" | "interface_body" | "enum_body" | "enum_body_declarations" | "annotation_type_body" => {
            ("bodyDeclarations", true)
        }
        "formal_parameters" | "inferred_parameters" => ("parameters", true),
        "argument_list" => (slots::ARGUMENTS, true),
        "switch_block" => (slots::STATEMENTS, true),
        "resource_specification" => ("resources", true),
        "superclass" => ("superclassType", false),
        "super_interfaces" | "extends_interfaces" | "type_list" => ("superInterfaceTypes", true),
        "finally_clause" => ("finally", false),
        _ => return None,
    };
    Some(slot)
}

/// Categories whose nodes are leaves: their text is their value.
pub(crate) fn is_leaf(category: Category, ts_kind: &str) -> bool {
    matches!(category, Category::Name | Category::Type | Category::Literal)
        || matches!(ts_kind, "import_declaration" | "package_declaration" | "this" | "super")
}

/// Slot a child fills, from the parent's grammar kind and the child's field.
pub(crate) fn slot_for(parent: &str, field: Option<&str>, child: &str) -> (&'static str, bool) {
    match (parent, field) {
        ("program", _) => match child {
            "package_declaration" => ("package", false),
            "import_declaration" => ("imports", true),
            _ => ("types", true),
        },
        ("block" | "constructor_body" | "switch_block_statement_group" | "switch_rule", _) => {
            match child {
                "switch_label" => ("label", false),
                _ => (slots::STATEMENTS, true),
            }
        }
        ("if_statement", Some("condition")) => (slots::EXPRESSION, false),
        ("if_statement", Some("consequence")) => (slots::THEN, false),
        ("if_statement", Some("alternative")) => (slots::ELSE, false),
        (
            "while_statement" | "do_statement" | "switch_expression" | "synchronized_statement",
            Some("condition"),
        ) => (slots::EXPRESSION, false),
        ("for_statement", Some("init")) => ("initializers", true),
        ("for_statement", Some("condition")) => (slots::EXPRESSION, false),
        ("for_statement", Some("update")) => ("updaters", true),
        ("enhanced_for_statement", Some("value")) => (slots::EXPRESSION, false),
        ("binary_expression" | "instanceof_expression", Some("left")) => (slots::LEFT_OPERAND, false),
        ("binary_expression" | "instanceof_expression", Some("right")) => (slots::RIGHT_OPERAND, false),
        ("unary_expression" | "update_expression", _) => ("operand", false),
        ("assignment_expression", Some("left")) => ("leftHandSide", false),
        ("assignment_expression", Some("right")) => ("rightHandSide", false),
        ("method_invocation" | "field_access" | "method_reference", Some("object")) => {
            (slots::EXPRESSION, false)
        }
        ("field_access", Some("field")) => (slots::NAME, false),
        ("array_access", Some("array")) => ("array", false),
        ("array_access", Some("index")) => ("index", false),
        ("cast_expression", Some("value")) => (slots::EXPRESSION, false),
        ("ternary_expression", Some("condition")) => (slots::EXPRESSION, false),
        ("ternary_expression", Some("consequence")) => ("thenExpression", false),
        ("ternary_expression", Some("alternative")) => ("elseExpression", false),
        ("variable_declarator", Some("value")) => ("initializer", false),
        ("local_variable_declaration" | "field_declaration" | "constant_declaration", Some("declarator")) => {
            ("fragments", true)
        }
        ("method_declaration", Some("type")) => ("returnType2", false),
        ("try_statement" | "try_with_resources_statement", None) if child == "catch_clause" => {
            ("catchClauses", true)
        }
        ("catch_clause", None) => ("exception", false),
        (
            "return_statement" | "throw_statement" | "yield_statement" | "parenthesized_expression"
            | "expression_statement" | "assert_statement",
            None,
        ) => (slots::EXPRESSION, false),
        ("array_initializer" | "array_creation_expression", _) => ("expressions", true),
        (_, Some("name")) => (slots::NAME, false),
        (_, Some("type")) => ("type", false),
        (_, Some("body")) => ("body", false),
        (_, Some("arguments")) => (slots::ARGUMENTS, true),
        (_, Some("parameters")) => ("parameters", true),
        (_, Some("dimensions")) => ("dimensions", false),
        (_, Some("superclass")) => ("superclassType", false),
        (_, Some("interfaces")) => ("superInterfaceTypes", true),
        (_, _) => ("children", true),
    }
}

/// Grammar kinds that open a lexical scope.
pub(crate) fn opens_scope(ts_kind: &str) -> bool {
    matches!(
        ts_kind,
        "method_declaration"
            | "constructor_declaration"
            | "compact_constructor_declaration"
            | "block"
            | "constructor_body"
            | "for_statement"
            | "enhanced_for_statement"
            | "catch_clause"
            | "lambda_expression"
            | "try_with_resources_statement"
            | "switch_block_statement_group"
    )
}
