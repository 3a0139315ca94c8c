use xpath_engine::{Context, Document, Expr, XPathParser};

/// Every combination of axis, node test and predicate must parse, and
/// every parsed expression must evaluate to a value on an arbitrary
/// document.
#[test]
fn generated_corpus_parses_and_evaluates() {
    let axes = [
        "",
        "child::",
        "descendant::",
        "descendant-or-self::",
        "ancestor::",
        "ancestor-or-self::",
        "self::",
        "following::",
        "following-sibling::",
        "preceding::",
        "preceding-sibling::",
        "parent::",
        "attribute::",
        "namespace::",
    ];
    let node_tests = [
        "*",
        "item",
        "ns:item",
        "ns:*",
        "node()",
        "text()",
        "comment()",
        "processing-instruction()",
    ];
    let predicates = [
        "",
        "[1]",
        "[last()]",
        "[@id='x']",
        "[position() mod 2 = 0]",
    ];

    let doc = Document::parse_str(
        "<container><item id=\"x\">v</item><item/><ns:item xmlns:ns=\"urn:ns\"/></container>",
    )
    .unwrap();
    let ctx = Context::new(doc.root());

    let mut parser = XPathParser::new();
    let mut corpus = 0usize;

    for axis in axes {
        for node_test in node_tests {
            for predicate in predicates {
                let expression = format!("//container/{axis}{node_test}{predicate}");
                let parsed = parser
                    .parse(&expression)
                    .unwrap_or_else(|e| panic!("parse failed for {expression:?}: {e}"));
                parsed
                    .evaluate(&ctx)
                    .unwrap_or_else(|e| panic!("evaluation failed for {expression:?}: {e}"));
                corpus += 1;
            }
        }
    }

    // Non-Latin identifiers parse like any other name.
    for expression in [
        "//данные[@значение='да']",
        "/ルート/子/孫",
        "//Ελλάδα/πόλη[1]",
        "concat(//名, '-', //字)",
        "$переменная + 1",
    ] {
        parser
            .parse(expression)
            .unwrap_or_else(|e| panic!("parse failed for {expression:?}: {e}"));
        corpus += 1;
    }

    assert!(corpus > 200, "corpus only had {corpus} expressions");
}

fn steps(parser: &mut XPathParser, expression: &str) -> Vec<bool> {
    match &*parser.parse(expression).unwrap() {
        Expr::Location(path) => path
            .steps
            .iter()
            .map(|s| s.has_positional_predicate)
            .collect(),
        other => panic!("expected location path for {expression:?}, got {other:?}"),
    }
}

#[test]
fn positional_predicate_detection_table() {
    let mut parser = XPathParser::new();

    // '//a' is descendant-or-self::node() followed by child::a; the
    // flag of interest sits on the second step.
    assert_eq!(steps(&mut parser, "//a"), [false, false]);

    for positional in [
        "//a[1]",
        "//a[last()]",
        "//a[position()=1]",
        "//a[@foo and position()=2]",
        "//a[0+1]",
        "//a[string-length('bar')]",
    ] {
        assert_eq!(
            steps(&mut parser, positional),
            [false, true],
            "{positional} should be positional"
        );
    }

    for plain in ["//a[@foo]", "//a[@foo='1']", "//a[b[1]]"] {
        assert_eq!(
            steps(&mut parser, plain),
            [false, false],
            "{plain} should not be positional"
        );
    }
}

#[test]
fn fast_paths_agree_with_the_grammar() {
    // The same text parsed through the fast path and forced through the
    // general grammar (by wrapping in a no-op) evaluates identically.
    let doc = Document::parse_str(
        "<page><request><q a=\"1\">t</q></request></page>",
    )
    .unwrap();
    let ctx = Context::new(doc.root());
    let mut parser = XPathParser::new();

    for (fast, slow) in [
        ("/page/request/q", "/page/request/q[true()]"),
        ("request", "child::request"),
        ("42", "(42)"),
    ] {
        let a = parser.eval(fast, &ctx).unwrap();
        let b = parser.eval(slow, &ctx).unwrap();
        assert_eq!(a.string_value(), b.string_value(), "{fast} vs {slow}");
    }

    let stats = parser.stats();
    assert!(stats.fast_path_hits >= 3);
}
