//! End-to-end VFL round-trip: parse a line, wire the emitted records into a
//! real solver, and check the resulting layout. Mirrors how
//! `gtk/testsuite/gtk/constraint-solver.c` drives the VFL parser against the
//! solver in the original.

use std::collections::HashMap;

use cassowary_core::{Expression, Variable};
use cassowary_solver::Solver;
use vfl_parser::{Parser, VflConstraint};

fn wire(solver: &mut Solver, views: &HashMap<String, Variable>, c: &VflConstraint) {
    let subject = views[&c.view1].clone();

    let expr = match (&c.view2, &c.attr2) {
        (Some(view2), Some(_attr2)) => {
            let mut e = Expression::from_variable(views[view2].clone());
            if c.multiplier != 1.0 {
                e.multiply_by(c.multiplier);
            }
            e.constant += c.constant;
            e
        }
        _ => Expression::from_constant(c.constant),
    };

    solver.add_constraint(Some(&subject), c.relation, Some(expr), c.strength);
}

#[test]
fn horizontal_chain_lays_out_widths() {
    let mut solver = Solver::new();
    let super_width = solver.create_variable(None, Some("super.width"), 100.0);
    let a_width = solver.create_variable(None, Some("a.width"), 0.0);
    let b_width = solver.create_variable(None, Some("b.width"), 0.0);

    let mut views = HashMap::new();
    views.insert("super".to_string(), super_width.clone());
    views.insert("a".to_string(), a_width.clone());
    views.insert("b".to_string(), b_width.clone());

    let mut parser = Parser::new();
    parser.set_views(views.keys().cloned());
    parser.parse_line("H:[a(==b)]").unwrap();

    for c in parser.get_constraints() {
        wire(&mut solver, &views, &c);
    }
    solver.resolve();

    assert_eq!(a_width.value(), b_width.value());
}

#[test]
fn explicit_spacing_is_a_required_equality() {
    let mut solver = Solver::new();
    let a_left = solver.create_variable(None, Some("a.left"), 0.0);
    let a_right = solver.create_variable(None, Some("a.right"), 0.0);
    let b_left = solver.create_variable(None, Some("b.left"), 0.0);

    solver.add_constraint(Some(&a_left), cassowary_core::Relation::Equal, Some(Expression::from_constant(0.0)), cassowary_core::Strength::REQUIRED);
    solver.add_constraint(Some(&a_right), cassowary_core::Relation::Equal, Some(Expression::from_constant(50.0)), cassowary_core::Strength::REQUIRED);

    let mut views = HashMap::new();
    views.insert("a".to_string(), a_right.clone());
    views.insert("b".to_string(), b_left.clone());

    let mut parser = Parser::new();
    parser.set_views(views.keys().cloned());
    parser.set_default_spacing(12.0, 12.0);
    parser.parse_line("H:[a]-[b]").unwrap();

    let constraints = parser.get_constraints();
    let spacing = constraints.iter().find(|c| c.view1 == "a" && c.view2.as_deref() == Some("b")).unwrap();
    assert_eq!(spacing.constant, -12.0);

    wire(&mut solver, &views, spacing);
    solver.resolve();

    // a.end == b.start + constant, with constant == -spacing, so
    // b.start == a.end + spacing: `b` starts 12pt after `a` ends.
    assert_eq!(b_left.value(), 50.0 + 12.0);
}

#[test]
fn unresolved_view_reports_offset_and_range() {
    let mut parser = Parser::new();
    parser.set_views(["a".to_string()]);
    let err = parser.parse_line("H:[a]-[ghost]").unwrap_err();

    assert_eq!(err.kind, vfl_parser::ParseErrorKind::InvalidView);
    assert!(err.range > 0);
}

#[test]
fn parse_failure_is_logged() {
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'w> tracing_subscriber::fmt::MakeWriter<'w> for Capture {
        type Writer = Capture;
        fn make_writer(&'w self) -> Self::Writer {
            self.clone()
        }
    }

    let capture = Capture::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(capture.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        let mut parser = Parser::new();
        parser.set_views(["a".to_string()]);
        let _ = parser.parse_line("H:[a]-[ghost]");
    });

    let log = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
    assert!(log.contains("vfl parse failed"), "log output: {log}");
}
