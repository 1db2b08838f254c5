//! Integration tests for view, layout and partial composition

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pretty_assertions::assert_eq;
use theme_views::{
    CompileError, Compiler, Dialect, Locals, MemoryFs, OutputStack, RenderContext, Renderer,
    ThemeConfig, ThemeFs, Value, ViewError, ViewOptions,
};

fn theme() -> Arc<MemoryFs> {
    let fs = Arc::new(MemoryFs::new());
    fs.add_file(
        "theme/views/layouts/default.php",
        "<html><% yield() %></html>",
    );
    fs
}

fn renderer(fs: &Arc<MemoryFs>) -> Renderer {
    let fs: Arc<dyn ThemeFs> = fs.clone();
    Renderer::with_fs(ThemeConfig::new("theme"), fs)
}

fn render_view(renderer: &Renderer, name: &str, options: ViewOptions) -> (String, Result<(), ViewError>) {
    let mut sink = Vec::new();
    let result = renderer.render_view(name, options, &mut sink);
    (String::from_utf8(sink).expect("utf-8 page"), result)
}

/// Haml compiler that counts its invocations
#[derive(Debug)]
struct CountingHaml {
    calls: Arc<AtomicUsize>,
}

impl Compiler for CountingHaml {
    fn dialect(&self) -> Dialect {
        Dialect::Haml
    }

    fn compile(&self, source: &str, path: &Path) -> Result<String, CompileError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        theme_views::HamlCompiler::new().compile(source, path)
    }
}

#[test]
fn test_view_is_yielded_inside_layout_with_view_locals() {
    let fs = theme();
    fs.add_file("theme/views/home.php", "x=<%= x %>");
    let options = ViewOptions::default().locals(Locals::new().with("x", 1));

    let (page, result) = render_view(&renderer(&fs), "home", options);

    result.expect("render");
    assert_eq!(page, "<html>x=1</html>");
}

#[test]
fn test_layout_sees_view_locals() {
    let fs = Arc::new(MemoryFs::new());
    fs.add_file(
        "theme/views/layouts/default.php",
        "<title><%= title %></title><% yield() %>",
    );
    fs.add_file("theme/views/page.php", "body");
    let options = ViewOptions::default().locals(Locals::new().with("title", "T"));

    let (page, result) = render_view(&renderer(&fs), "page", options);

    result.expect("render");
    assert_eq!(page, "<title>T</title>body");
}

#[test]
fn test_named_layout_from_options() {
    let fs = theme();
    fs.add_file("theme/views/layouts/print.php", "[<% yield() %>]");
    fs.add_file("theme/views/home.php", "home");
    let options = ViewOptions::from_value(
        serde_json::json!({ "layout": "print", "unused": 1 }).into(),
    )
    .expect("options");

    let (page, result) = render_view(&renderer(&fs), "home", options);

    result.expect("render");
    assert_eq!(page, "[home]");
}

#[test]
fn test_configured_default_layout() {
    let fs = theme();
    fs.add_file("theme/views/layouts/bare.php", "<% yield() %>!");
    fs.add_file("theme/views/home.php", "home");
    let dyn_fs: Arc<dyn ThemeFs> = fs.clone();
    let renderer = Renderer::with_fs(
        ThemeConfig::new("theme").with_default_layout("bare"),
        dyn_fs,
    );

    let (page, result) = render_view(&renderer, "home", renderer.view_options());

    result.expect("render");
    assert_eq!(page, "home!");
}

#[test]
fn test_partials_use_underscore_convention() {
    let fs = theme();
    fs.add_file(
        "theme/views/posts/index.php",
        "<% for post in posts %><% partial(\"posts/item\", post: post) %><% end %>",
    );
    fs.add_file("theme/views/posts/_item.php", "<li><%= post %></li>");
    let locals = Locals::new().with("posts", vec!["a", "b"]);

    let (page, result) = render_view(
        &renderer(&fs),
        "posts/index",
        ViewOptions::default().locals(locals),
    );

    result.expect("render");
    assert_eq!(page, "<html><li>a</li><li>b</li></html>");
}

#[test]
fn test_already_prefixed_partial_name_is_not_prefixed_again() {
    let fs = theme();
    fs.add_file("theme/views/_nav.php", "nav");
    fs.add_file(
        "theme/views/home.php",
        "<% partial(\"nav\") %>|<% partial(\"_nav\") %>",
    );

    let (page, result) = render_view(&renderer(&fs), "home", ViewOptions::default());

    result.expect("render");
    assert_eq!(page, "<html>nav|nav</html>");
}

#[test]
fn test_partial_content_matches_streamed_output() {
    let fs = theme();
    fs.add_file("theme/views/_badge.php", "<b><%= n %></b>");
    fs.add_file(
        "theme/views/home.php",
        "<% partial(\"badge\", n: 1) %>=<%= partial_content(\"badge\", n: 1) %>",
    );

    let (page, result) = render_view(&renderer(&fs), "home", ViewOptions::default());

    result.expect("render");
    assert_eq!(page, "<html><b>1</b>=<b>1</b></html>");
}

#[test]
fn test_captured_partial_can_be_post_processed() {
    let fs = theme();
    fs.add_file("theme/views/_snippet.php", "<i>x</i>");
    fs.add_file(
        "theme/views/home.php",
        "<%= escape(partial_content(\"snippet\")) %>",
    );

    let (page, result) = render_view(&renderer(&fs), "home", ViewOptions::default());

    result.expect("render");
    assert_eq!(page, "<html>&lt;i&gt;x&lt;/i&gt;</html>");
}

#[test]
fn test_haml_view_in_native_layout() {
    let fs = theme();
    fs.add_file(
        "theme/views/posts/show.html.haml",
        "%article\n  %h1= post.title\n  - if post.draft\n    %p.note Draft\n",
    );
    let post = Value::Map(
        [
            ("title".to_string(), Value::from("Hello")),
            ("draft".to_string(), Value::from(true)),
        ]
        .into_iter()
        .collect(),
    );
    let options = ViewOptions::default().locals(Locals::new().with("post", post));

    let (page, result) = render_view(&renderer(&fs), "posts/show", options);

    result.expect("render");
    assert_eq!(
        page,
        "<html><article>\n  <h1>Hello</h1>\n  <p class=\"note\">Draft</p>\n</article>\n</html>"
    );
    assert!(fs.is_file(Path::new("theme/tmp/posts/show.html.haml.php")));
}

#[test]
fn test_jade_layout_and_partial() {
    let fs = Arc::new(MemoryFs::new());
    fs.add_file(
        "theme/views/layouts/default.html.jade",
        "main\n  - yield()\n  = partial_content(\"footer\")\n",
    );
    fs.add_file("theme/views/home.php", "home\n");
    fs.add_file("theme/views/_footer.html.jade", "footer bye\n");

    let (page, result) = render_view(&renderer(&fs), "home", ViewOptions::default());

    result.expect("render");
    assert_eq!(page, "<main>\nhome\n  <footer>bye</footer>\n\n</main>\n");
}

#[test]
fn test_missing_template_shows_error_page() {
    let fs = theme();
    fs.add_file("theme/views/layouts/default.php", "started <% yield() %>");

    let (page, result) = render_view(&renderer(&fs), "nope", ViewOptions::default());

    match result {
        Err(ViewError::Halted(halted)) => {
            assert_eq!(halted.title, "Template missing");
            assert!(halted.message.contains("nope"));
        }
        other => panic!("Expected halted render, got {:?}", other),
    }
    assert!(page.contains("Template missing"));
    assert!(!page.contains("started"));
}

#[test]
fn test_missing_layout_is_template_missing() {
    let fs = Arc::new(MemoryFs::new());
    fs.add_file("theme/views/home.php", "home");

    let (_, result) = render_view(&renderer(&fs), "home", ViewOptions::default());

    match result {
        Err(ViewError::Halted(halted)) => {
            assert_eq!(halted.title, "Template missing");
            assert!(halted.message.contains("layouts/default"));
        }
        other => panic!("Expected halted render, got {:?}", other),
    }
}

#[test]
fn test_unwritable_cache_dir_halts_before_compiling() {
    let fs = theme();
    fs.add_file("theme/views/home.haml", "%p hi\n");
    fs.lock_dir("theme/tmp");
    let calls = Arc::new(AtomicUsize::new(0));
    let renderer = renderer(&fs).with_compiler(Box::new(CountingHaml {
        calls: Arc::clone(&calls),
    }));

    let (page, result) = render_view(&renderer, "home", ViewOptions::default());

    match result {
        Err(ViewError::Halted(halted)) => {
            assert_eq!(halted.title, "Directory not writable");
            assert!(halted.message.contains("theme/tmp"));
        }
        other => panic!("Expected halted render, got {:?}", other),
    }
    assert!(page.contains("Directory not writable"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_read_only_temp_dir_is_fixed_for_nested_view() {
    let fs = theme();
    fs.add_file("theme/views/posts/index.haml", "%p posts\n");
    fs.add_dir("theme/tmp", 0o555);

    let (page, result) = render_view(&renderer(&fs), "posts/index", ViewOptions::default());

    result.expect("render");
    assert_eq!(page, "<html><p>posts</p>\n</html>");
    assert_eq!(fs.dir_mode("theme/tmp"), Some(0o760));
    assert!(fs.contents("theme/tmp/posts/index.haml.php").is_some());
}

#[test]
fn test_compile_error_title_is_dialect_category() {
    let fs = theme();
    fs.add_file("theme/views/home.haml", "%p\n    %a\n  %b\n");

    let (page, result) = render_view(&renderer(&fs), "home", ViewOptions::default());

    match result {
        Err(ViewError::Halted(halted)) => {
            assert_eq!(halted.title, "HamlSyntaxError");
            assert!(halted.message.contains("home.haml:3"));
        }
        other => panic!("Expected halted render, got {:?}", other),
    }
    assert!(page.contains("HamlSyntaxError"));
}

#[test]
fn test_runtime_error_in_partial_discards_whole_page() {
    let fs = theme();
    fs.add_file("theme/views/_broken.php", "<%= undefined_function() %>");
    fs.add_file("theme/views/home.php", "before <% partial(\"broken\") %> after");

    let (page, result) = render_view(&renderer(&fs), "home", ViewOptions::default());

    assert!(matches!(result, Err(ViewError::Halted(_))));
    assert!(page.contains("TemplateRuntimeError"));
    assert!(!page.contains("before"));
}

#[test]
fn test_cache_compiles_once_and_recompiles_after_touch() {
    let fs = theme();
    fs.add_file("theme/views/home.haml", "%p hi\n");
    let calls = Arc::new(AtomicUsize::new(0));
    let renderer = renderer(&fs).with_compiler(Box::new(CountingHaml {
        calls: Arc::clone(&calls),
    }));

    for _ in 0..2 {
        let (page, result) = render_view(&renderer, "home", ViewOptions::default());
        result.expect("render");
        assert_eq!(page, "<html><p>hi</p>\n</html>");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    fs.touch("theme/views/home.haml");
    render_view(&renderer, "home", ViewOptions::default())
        .1
        .expect("render");
    render_view(&renderer, "home", ViewOptions::default())
        .1
        .expect("render");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_resolution_prefers_earlier_suffix() {
    let fs = theme();
    fs.add_file("theme/views/home.php", "php");
    fs.add_file("theme/views/home.html.php", "html.php");
    fs.add_file("theme/views/home.haml", "haml\n");

    let (page, result) = render_view(&renderer(&fs), "home", ViewOptions::default());

    result.expect("render");
    assert_eq!(page, "<html>haml\n</html>");

    let file = renderer(&fs)
        .resolver()
        .resolve("home", fs.as_ref())
        .expect("resolved");
    assert_eq!(file.path, PathBuf::from("theme/views/home.haml"));
}

#[test]
fn test_successive_views_keep_their_own_yield_target() {
    let fs = theme();
    fs.add_file("theme/views/outer.php", "outer(<%= inner %>)");
    let renderer = renderer(&fs);

    let (first, _) = render_view(
        &renderer,
        "outer",
        ViewOptions::default().locals(Locals::new().with("inner", "a")),
    );
    let (second, _) = render_view(
        &renderer,
        "outer",
        ViewOptions::default().locals(Locals::new().with("inner", "b")),
    );

    assert_eq!(first, "<html>outer(a)</html>");
    assert_eq!(second, "<html>outer(b)</html>");
}

#[test]
fn test_render_template_directly_without_view() {
    let fs = theme();
    fs.add_file("theme/views/plain.php", "n=<%= n %>");
    let mut out = OutputStack::new();

    renderer(&fs)
        .render_template(
            "plain",
            &Locals::new().with("n", 2),
            &RenderContext::new(),
            &mut out,
        )
        .expect("render");

    assert_eq!(out.finish(), "n=2");
}

#[test]
fn test_render_fragment_renders_partial_without_layout() {
    let fs = theme();
    fs.add_file("theme/views/widgets/_clock.php", "<%= time %>");
    let mut sink = Vec::new();

    renderer(&fs)
        .render_fragment(
            "widgets/clock",
            &Locals::new().with("time", "12:00"),
            &mut sink,
        )
        .expect("render");

    assert_eq!(String::from_utf8(sink).unwrap(), "12:00");
}
