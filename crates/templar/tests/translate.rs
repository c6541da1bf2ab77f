//! End-to-end translation between the built-in languages.

use templar::{IrNode, TranslateArgs, TranslateError, WriteError, translate};

fn liquid_to_nunjucks(source: &str) -> Result<String, TranslateError> {
    translate(&TranslateArgs::new().from("liquid").to("nunjucks").input(source))
}

fn nunjucks_to_liquid(source: &str) -> Result<String, TranslateError> {
    translate(&TranslateArgs::new().from("nunjucks").to("liquid").input(source))
}

// ============================================================================
// Liquid -> Nunjucks
// ============================================================================

mod liquid_to_nunjucks {
    use super::*;

    fn convert(source: &str) -> String {
        liquid_to_nunjucks(source).expect("translation failed")
    }

    #[test]
    fn filter_names_are_mapped() {
        assert_eq!(convert("Hello {{ name | upcase }}!"), "Hello {{ name | upper }}!");
        assert_eq!(
            convert("{{ body | strip_html | newline_to_br }}"),
            "{{ body | striptags | nl2br }}"
        );
    }

    #[test]
    fn arithmetic_filters_become_operators() {
        assert_eq!(
            convert("{{ price | plus: tax | times: quantity }}"),
            "{{ (price + tax) * quantity }}"
        );
    }

    #[test]
    fn forloop_properties_inside_loop() {
        assert_eq!(
            convert("{% for item in items %}{{ forloop.rindex }}{% endfor %}"),
            "{% for item in items %}{{ loop.revindex }}{% endfor %}"
        );
    }

    #[test]
    fn forloop_outside_loop_is_an_ordinary_variable() {
        assert_eq!(convert("{{ forloop.rindex }}"), "{{ forloop.rindex }}");
    }

    #[test]
    fn loop_else_uses_outer_scope() {
        assert_eq!(
            convert("{% for x in xs %}{{ x }}{% else %}{{ forloop.index }}{% endfor %}"),
            "{% for x in xs %}{{ x }}{% else %}{{ forloop.index }}{% endfor %}"
        );
    }

    #[test]
    fn unless_becomes_negated_if() {
        assert_eq!(
            convert("{% unless user %}Guest{% endunless %}"),
            "{% if not user %}Guest{% endif %}"
        );
    }

    #[test]
    fn boolean_operators_group_right_to_left() {
        assert_eq!(
            convert("{% if a and b or c %}y{% endif %}"),
            "{% if a and (b or c) %}y{% endif %}"
        );
    }

    #[test]
    fn contains_becomes_in() {
        assert_eq!(
            convert("{% if tags contains 'sale' %}!{% endif %}"),
            "{% if 'sale' in tags %}!{% endif %}"
        );
    }

    #[test]
    fn case_lowers_to_if_chain() {
        assert_eq!(
            convert("{% case color %}{% when 'red' %}R{% when 'blue' %}B{% else %}X{% endcase %}"),
            "{% if color == 'red' %}R{% elif color == 'blue' %}B{% else %}X{% endif %}"
        );
    }

    #[test]
    fn multi_value_when_is_refused() {
        let err = liquid_to_nunjucks("{% case c %}{% when 1, 2 %}x{% endcase %}").unwrap_err();
        assert!(matches!(err, TranslateError::Write(_)), "{err:?}");
    }

    #[test]
    fn assignments() {
        assert_eq!(
            convert("{% assign total = price | times: 2 %}"),
            "{% set total = price * 2 %}"
        );
        assert_eq!(
            convert("{% capture greeting %}Hi {{ name }}{% endcapture %}"),
            "{% set greeting %}Hi {{ name }}{% endset %}"
        );
    }

    #[test]
    fn where_becomes_selectattr() {
        assert_eq!(
            convert("{{ products | where: 'type', 'book' }}"),
            "{{ products | selectattr('type', 'book') }}"
        );
    }

    #[test]
    fn comments_and_raw_blocks() {
        assert_eq!(convert("{% comment %}note{% endcomment %}"), "{# note #}");
        assert_eq!(
            convert("{% raw %}{{ not parsed }}{% endraw %}"),
            "{% raw %}{{ not parsed }}{% endraw %}"
        );
    }

    #[test]
    fn includes() {
        assert_eq!(convert("{% include 'header' %}"), "{% include 'header' %}");
    }

    #[test]
    fn trim_markers_on_opening_tags() {
        assert_eq!(
            convert("{%- if x -%}a{% endif %}{{- y -}}"),
            "{%- if x -%}a{% endif %}{{- y -}}"
        );
    }

    #[test]
    fn closing_tag_markers_are_kept() {
        assert_eq!(
            convert("{%- if x -%} y {%- endif -%}"),
            "{%- if x -%} y {%- endif -%}"
        );
        assert_eq!(
            convert("{% for i in xs %}{{ i }}{%- else -%}none{% endfor -%}"),
            "{% for i in xs %}{{ i }}{%- else -%}none{% endfor -%}"
        );
        assert_eq!(
            convert("{% case c %}{%- when 1 -%}a{% endcase %}"),
            "{% if c == 1 -%}a{% endif %}"
        );
        assert_eq!(
            convert("{%- comment %}x{% endcomment -%}"),
            "{#- x -#}"
        );
    }

    #[test]
    fn break_is_refused_with_a_hint() {
        let err = liquid_to_nunjucks("{% for x in xs %}{% break %}{% endfor %}").unwrap_err();
        assert_eq!(
            err,
            TranslateError::Write(
                WriteError::unsupported("Nunjucks", "'break' statements")
                    .with_hint("Restructure the loop with conditionals instead")
            )
        );
        assert_eq!(
            err.to_string(),
            "Nunjucks does not support 'break' statements. Restructure the loop with conditionals instead"
        );
    }

    #[test]
    fn loop_modifiers_are_refused() {
        let err = liquid_to_nunjucks("{% for x in xs limit: 2 %}{% endfor %}").unwrap_err();
        assert!(matches!(err, TranslateError::Read(_)), "{err:?}");
    }
}

// ============================================================================
// Nunjucks -> Liquid
// ============================================================================

mod nunjucks_to_liquid {
    use super::*;

    fn convert(source: &str) -> String {
        nunjucks_to_liquid(source).expect("translation failed")
    }

    #[test]
    fn filter_names_are_mapped() {
        assert_eq!(convert("Hello {{ name | upper }}!"), "Hello {{ name | upcase }}!");
    }

    #[test]
    fn grouped_arithmetic_becomes_filter_chain() {
        assert_eq!(
            convert("{{ (price + tax) * quantity }}"),
            "{{ price | plus: tax | times: quantity }}"
        );
    }

    #[test]
    fn ungroupable_arithmetic_is_refused() {
        let err = nunjucks_to_liquid("{{ a * (b + c) }}").unwrap_err();
        assert!(err.to_string().starts_with("Liquid does not support"), "{err}");
    }

    #[test]
    fn loop_revindex_inside_loop() {
        assert_eq!(
            convert("{% for item in items %}{{ loop.revindex0 }}{% endfor %}"),
            "{% for item in items %}{{ forloop.rindex0 }}{% endfor %}"
        );
    }

    #[test]
    fn if_not_becomes_unless() {
        assert_eq!(
            convert("{% if not user %}Guest{% endif %}"),
            "{% unless user %}Guest{% endunless %}"
        );
    }

    #[test]
    fn nested_not_is_refused_with_a_hint() {
        let err = nunjucks_to_liquid("{% if not a and b %}x{% endif %}").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Liquid does not support the 'not' operator. Use an unless block instead"
        );
    }

    #[test]
    fn elif_becomes_elsif() {
        assert_eq!(
            convert("{% if a %}1{% elif b %}2{% else %}3{% endif %}"),
            "{% if a %}1{% elsif b %}2{% else %}3{% endif %}"
        );
    }

    #[test]
    fn in_becomes_contains() {
        assert_eq!(
            convert("{% if 'sale' in tags %}!{% endif %}"),
            "{% if tags contains 'sale' %}!{% endif %}"
        );
    }

    #[test]
    fn comments_survive() {
        assert_eq!(
            convert("a{# note #}b"),
            "a{% comment %}note{% endcomment %}b"
        );
    }

    #[test]
    fn raw_blocks_keep_their_content() {
        assert_eq!(
            convert("{% raw %}{{ x }}{% endraw %}"),
            "{% raw %}{{ x }}{% endraw %}"
        );
    }

    #[test]
    fn includes() {
        assert_eq!(convert("{% include \"nav.html\" %}"), "{% include \"nav.html\" %}");
        let err = nunjucks_to_liquid("{% include 'x' ignore missing %}").unwrap_err();
        assert!(matches!(err, TranslateError::Write(_)), "{err:?}");
    }

    #[test]
    fn closing_tag_markers_are_kept() {
        assert_eq!(
            convert("{%- if x -%} y {%- elif z %}w{%- endif -%}"),
            "{%- if x -%} y {%- elsif z %}w{%- endif -%}"
        );
        assert_eq!(
            convert("{% set s -%}hi{%- endset %}"),
            "{% capture s -%}hi{%- endcapture %}"
        );
        assert_eq!(
            convert("{#- note -#}"),
            "{%- comment %}note{% endcomment -%}"
        );
    }

    #[test]
    fn set_becomes_assign() {
        assert_eq!(convert("{% set n = items | length %}"), "{% assign n = items | size %}");
    }

    #[test]
    fn unsupported_expressions_fail_to_read() {
        for source in ["{{ x if y else z }}", "{{ range(3) }}", "{{ x is defined }}"] {
            let err = nunjucks_to_liquid(source).unwrap_err();
            assert!(matches!(err, TranslateError::Read(_)), "{source}: {err:?}");
        }
    }
}

// ============================================================================
// Shared behavior
// ============================================================================

#[test]
fn quotes_are_preserved() {
    for source in [r#"{{ 'single' }}{{ "double" }}"#, r#"{{ 'it''s' }}{{ "it's" }}"#] {
        assert_eq!(liquid_to_nunjucks(source).unwrap(), source);
        assert_eq!(nunjucks_to_liquid(source).unwrap(), source);
    }
}

#[test]
fn text_is_untouched() {
    let source = "<p>\n  plain {text} with { braces }\n</p>\n";
    assert_eq!(liquid_to_nunjucks(source).unwrap(), source);
    assert_eq!(nunjucks_to_liquid(source).unwrap(), source);
}

#[test]
fn nunjucks_sort_keywords_keep_their_order() {
    let args = TranslateArgs::new()
        .from("nunjucks")
        .to("nunjucks")
        .input("{{ xs | sort(attribute='name', reverse=true) }}");
    assert_eq!(
        translate(&args).unwrap(),
        "{{ xs | sort(attribute='name', reverse=true) }}"
    );
}

#[test]
fn nunjucks_comments_are_padded() {
    let args = TranslateArgs::new().from("nunjucks").to("nunjucks").input("{#x#}{#-  y  -#}");
    assert_eq!(translate(&args).unwrap(), "{# x #}{#- y -#}");
}

#[test]
fn missing_arguments_are_all_reported() {
    let err = translate(&TranslateArgs::new()).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Invalid argument \"from\": expected string (e.g. \"nunjucks\")\n\
         Invalid argument \"to\": expected string (e.g. \"liquid\")\n\
         Invalid argument \"input\": expected string (the template content)"
    );
}

#[test]
fn unknown_target_is_a_validation_error() {
    let err = translate(&TranslateArgs::new().from("liquid").to("jinja").input("x")).unwrap_err();
    let TranslateError::Validation(validation) = err else {
        panic!("expected a validation error");
    };
    assert_eq!(
        validation.violations,
        vec!["unsupported language \"jinja\". Supported: liquid, nunjucks".to_string()]
    );
}

#[test]
fn same_language_is_allowed() {
    let args = TranslateArgs::new()
        .from("liquid")
        .to("liquid")
        .input("{{ a | plus: 1 }}");
    assert_eq!(translate(&args).unwrap(), "{{ a | plus: 1 }}");
}

#[test]
fn custom_writer_receives_the_ir() {
    let args = TranslateArgs::new()
        .from("liquid")
        .to("kinds")
        .input("a{{ b }}{% if c %}{% endif %}")
        .custom_renderer("kinds", |nodes: &[IrNode]| {
            Ok(nodes
                .iter()
                .map(IrNode::kind)
                .collect::<Vec<_>>()
                .join(","))
        });
    assert_eq!(translate(&args).unwrap(), "text,output,conditional");
}

#[test]
fn custom_reader_shadows_builtin_for_one_call() {
    let args = TranslateArgs::new()
        .from("liquid")
        .to("nunjucks")
        .input("ignored")
        .custom_parser("liquid", |_: &str| Ok(vec![IrNode::text("custom")]));
    assert_eq!(translate(&args).unwrap(), "custom");

    let plain = TranslateArgs::new().from("liquid").to("nunjucks").input("ignored");
    assert_eq!(translate(&plain).unwrap(), "ignored");
}
