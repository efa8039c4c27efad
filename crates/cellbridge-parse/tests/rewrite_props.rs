use cellbridge_parse::{
    AccessPattern, SourceDialect, SourceLexer, SourceRewriter, rewrite_for_async_access,
};
use proptest::prelude::*;

const FRAGMENTS: &[&str] = &[
    "q.cells('A1')",
    "q.cells(q.cells(\"B2\"))",
    "x.q.cells(1)",
    "f(",
    ")",
    " ",
    "\n",
    "x",
    "`t${",
    "}`",
    "'(('",
    "\")\"",
    ";",
    "// q.cells(2)\n",
    "await ",
    "/(/g",
    " / 2",
];

fn program() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(FRAGMENTS), 0..24).prop_map(|parts| parts.concat())
}

proptest! {
    // No identifier `q` can appear, so there is nothing to rewrite.
    #[test]
    fn sources_without_calls_are_unchanged(src in r#"[a-pr-z0-9 ()'"`${}.;\n/*#]{0,64}"#) {
        prop_assert_eq!(rewrite_for_async_access(&src), src.as_str());
    }

    #[test]
    fn rewriting_is_idempotent(src in program()) {
        let once = rewrite_for_async_access(&src).into_owned();
        let twice = rewrite_for_async_access(&once).into_owned();
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn lexer_covers_all_input(src in program()) {
        if let Ok(lexer) = SourceLexer::new(&src, SourceDialect::JavaScript) {
            prop_assert_eq!(lexer.render(), src);
        }
    }
}

#[test]
fn regex_and_division_mix() {
    let src = "const r = /[)/]/.test(s) ? q.cells('A1') / 2 : q.cells(`${/}/.source}`);";
    assert_eq!(
        rewrite_for_async_access(src),
        "const r = /[)/]/.test(s) ? (await q.cells('A1')) / 2 : (await q.cells(`${/}/.source}`));"
    );
}

#[test]
fn each_site_gets_exactly_one_await() {
    let rw = SourceRewriter::new(AccessPattern::parse("f").unwrap(), SourceDialect::JavaScript);
    let out = rw.rewrite("a = f(f(x)) + f(\"a)b\") + g(f(1))");
    assert_eq!(out, "a = (await f(f(x))) + (await f(\"a)b\")) + g((await f(1)))");
    assert_eq!(out.matches("await").count(), 3);
}
