//! Tests for the special forms and builtin functions.
use super::*;
use crate::config::{Collector, NilAccess};
use crate::error::ErrorKind;
use rstest::rstest;

/// Evaluate the input and print the last result.
fn eval_print(eval: &EvalEnvironment, input: &str) -> Result<String> {
    let v = eval.eval_str(input)?;
    Ok(eval.store().display(v))
}

#[test]
fn progn() -> Result<()> {
    let eval = EvalEnvironment::new()?;
    match eval.eval_str("(progn 1 2 3 4)")? {
        Value::Fixnum(4) => (),
        v => panic!("unexpected result: {v:?}"),
    };
    assert_eq!(eval.eval_str("(progn)")?, Value::Nil);
    Ok(())
}

#[test]
fn set_global_and_retrieve() -> Result<()> {
    let eval = EvalEnvironment::new()?;
    let got = eval.eval_str(
        r#"
        (set a 7)
        (set b a)
        b
        "#,
    )?;
    assert_eq!(got, Value::Fixnum(7));
    assert_eq!(eval.global("a")?, Some(Value::Fixnum(7)));
    assert_eq!(eval.global("never-set")?, None);
    Ok(())
}

#[test]
fn quote_is_not_evaluated() -> Result<()> {
    let eval = EvalEnvironment::new()?;
    assert_eq!(eval_print(&eval, "'(a b)")?, "(a b)");
    assert_eq!(eval_print(&eval, "''x")?, "(quote x)");
    let got = eval.eval_str("(quote unknown-symbol)")?;
    assert_eq!(got, eval.store().intern_str("unknown-symbol")?);
    Ok(())
}

#[test]
fn self_evaluating() -> Result<()> {
    let eval = EvalEnvironment::new()?;
    assert_eq!(eval.eval_str("t")?, eval.t());
    assert_eq!(eval_print(&eval, "\"str\"")?, "\"str\"");
    assert_eq!(eval_print(&eval, "#\\a")?, "#\\a");
    assert_eq!(eval_print(&eval, "#(1 x)")?, "#(1 x)");
    Ok(())
}

#[test]
fn unbound_variable() -> Result<()> {
    let eval = EvalEnvironment::new()?;
    match eval.eval_str("undefined-thing") {
        Err(Error::Unbound(m)) => assert_eq!(m, "loaded undefined: undefined-thing"),
        v => panic!("unexpected eval result: {:?}", v),
    };
    Ok(())
}

#[test]
fn undefined_function_is_not_an_arity_error() -> Result<()> {
    let eval = EvalEnvironment::new()?;
    match eval.eval_str("(nope 1)") {
        Err(Error::Unbound(m)) => assert_eq!(m, "undefined function: nope"),
        v => panic!("unexpected eval result: {:?}", v),
    };
    match eval.eval_str("(set-function 'one (lambda (x) x)) (one)") {
        Err(Error::Arity(m)) => assert_eq!(m, "one: expected 1 arguments, got 0"),
        v => panic!("unexpected eval result: {:?}", v),
    };
    Ok(())
}

#[test]
fn invoke_id() -> Result<()> {
    let eval = EvalEnvironment::new()?;
    assert_eq!(eval.eval_str("((lambda (x) x) 7)")?, Value::Fixnum(7));
    eval.eval_str("(set-function 'id (lambda (x) x))")?;
    assert_eq!(eval.eval_str("(id 7)")?, Value::Fixnum(7));
    assert_eq!(eval_print(&eval, "#'id")?, "#<function id>");
    assert_eq!(eval_print(&eval, "(get-function-name #'id)")?, "id");
    assert_eq!(eval_print(&eval, "(lambda (x) x)")?, "#<function anonymous>");
    assert_eq!(eval_print(&eval, "#'car")?, "#<function car>");
    Ok(())
}

#[test]
fn redefinition_is_seen_by_earlier_code() -> Result<()> {
    let eval = EvalEnvironment::new()?;
    eval.eval_str(
        r#"
        (set-function 'callee (lambda () 1))
        (set-function 'caller (lambda () (callee)))
        (set-function 'callee (lambda () 2))
        "#,
    )?;
    assert_eq!(eval.eval_str("(caller)")?, Value::Fixnum(2));
    Ok(())
}

#[test]
fn local_function_values() -> Result<()> {
    let eval = EvalEnvironment::new()?;
    let got = eval.eval_str("(let ((f (lambda (x) (+ x 1)))) (f 2))")?;
    assert_eq!(got, Value::Fixnum(3));
    let got = eval.eval_str("(let ((f #'+)) (funcall f 2 3))")?;
    assert_eq!(got, Value::Fixnum(5));
    Ok(())
}

#[test]
fn counter_closure() -> Result<()> {
    let eval = EvalEnvironment::new()?;
    eval.eval_str(
        r#"
        (set-function 'make-counter
          (lambda () (let ((n 0)) (lambda () (set n (+ n 1))))))
        (set c (make-counter))
        (set d (make-counter))
        "#,
    )?;
    assert_eq!(
        eval.eval_str("(funcall c) (funcall c) (funcall c)")?,
        Value::Fixnum(3)
    );
    assert_eq!(eval.eval_str("(funcall d)")?, Value::Fixnum(1));
    Ok(())
}

#[test]
fn captured_variables_are_copies() -> Result<()> {
    let eval = EvalEnvironment::new()?;
    let got = eval.eval_str("(let ((x 1)) (funcall (lambda () (set x 2))) x)")?;
    assert_eq!(got, Value::Fixnum(1));
    Ok(())
}

#[test]
fn nested_captures() -> Result<()> {
    let eval = EvalEnvironment::new()?;
    let got = eval.eval_str(
        r#"
        (let ((a 1) (b 10))
          (funcall (funcall (lambda () (lambda (c) (+ a b c)))) 100))
        "#,
    )?;
    assert_eq!(got, Value::Fixnum(111));
    Ok(())
}

#[test]
fn let_is_parallel() -> Result<()> {
    let eval = EvalEnvironment::new()?;
    assert_eq!(eval.eval_str("(set x 1) (let ((x 2) (y x)) y)")?, Value::Fixnum(1));
    assert_eq!(eval.eval_str("(let ((a 1)) (let ((a 2)) a))")?, Value::Fixnum(2));
    assert_eq!(eval.eval_str("(let ((a 1)) (let ((b 2)) a))")?, Value::Fixnum(1));
    assert_eq!(eval_print(&eval, "(let (a (b)) (list a b))")?, "(nil nil)");
    assert_eq!(eval.eval_str("(let ((a 1)))")?, Value::Nil);
    Ok(())
}

#[test]
fn cond_clauses() -> Result<()> {
    let eval = EvalEnvironment::new()?;
    assert_eq!(
        eval_print(&eval, "(cond ((= 1 2) 'a) ((= 1 1) 'b) (t 'c))")?,
        "b"
    );
    assert_eq!(eval.eval_str("(cond (nil 1))")?, Value::Nil);
    assert_eq!(eval.eval_str("(cond ((+ 1 2)))")?, Value::Fixnum(3));
    assert_eq!(eval.eval_str("(cond)")?, Value::Nil);
    Ok(())
}

#[test]
fn tagbody_loop() -> Result<()> {
    let eval = EvalEnvironment::new()?;
    let got = eval.eval_str(
        r#"
        (let ((i 0) (sum 0))
          (tagbody
           top
             (cond ((> i 10) (go done)))
             (set sum (+ sum i))
             (set i (+ i 1))
             (go top)
           done)
          sum)
        "#,
    )?;
    assert_eq!(got, Value::Fixnum(55));
    assert_eq!(eval.store().stack_len(), 0);
    Ok(())
}

#[test]
fn go_out_of_let() -> Result<()> {
    let eval = EvalEnvironment::new()?;
    let got = eval.eval_str(
        r#"
        (let ((n 0))
          (tagbody
           again
             (let ((a 1) (b 2))
               (set n (+ n a b))
               (cond ((< n 9) (go again)))))
          n)
        "#,
    )?;
    assert_eq!(got, Value::Fixnum(9));
    Ok(())
}

#[test]
fn recursion() -> Result<()> {
    let eval = EvalEnvironment::new()?;
    eval.eval_str(
        r#"
        (set-function 'fact
          (lambda (n) (cond ((= n 0) 1) (t (* n (fact (- n 1)))))))
        "#,
    )?;
    assert_eq!(eval.eval_str("(fact 10)")?, Value::Fixnum(3628800));
    Ok(())
}

#[test]
fn rest_arguments() -> Result<()> {
    let eval = EvalEnvironment::new()?;
    assert_eq!(eval_print(&eval, "((lambda (a &rest r) r) 1 2 3)")?, "(2 3)");
    assert_eq!(eval_print(&eval, "((lambda (&rest r) r))")?, "nil");
    assert_eq!(eval_print(&eval, "(apply #'list 1 2 '(3 4))")?, "(1 2 3 4)");
    assert_eq!(eval.eval_str("(apply #'+ '(1 2 3))")?, Value::Fixnum(6));
    Ok(())
}

#[test]
fn arithmetic() -> Result<()> {
    let eval = EvalEnvironment::new()?;
    assert_eq!(eval.eval_str("(+)")?, Value::Fixnum(0));
    assert_eq!(eval.eval_str("(- 5)")?, Value::Fixnum(-5));
    assert_eq!(eval.eval_str("(- 10 1 2)")?, Value::Fixnum(7));
    assert_eq!(eval.eval_str("(* 2 3 4)")?, Value::Fixnum(24));
    assert_eq!(eval.eval_str("(quot -7 2)")?, Value::Fixnum(-3));
    assert_eq!(eval.eval_str("(rem -7 2)")?, Value::Fixnum(-1));
    assert_eq!(eval.eval_str("(logand 12 10)")?, Value::Fixnum(8));
    assert_eq!(eval.eval_str("(logior 12 10)")?, Value::Fixnum(14));
    assert_eq!(eval.eval_str("(logxor 12 10)")?, Value::Fixnum(6));
    assert_eq!(eval.eval_str("(lognot 0)")?, Value::Fixnum(-1));
    assert_eq!(eval.eval_str("(ash 1 10)")?, Value::Fixnum(1024));
    assert_eq!(eval.eval_str("(ash -8 -1)")?, Value::Fixnum(-4));
    assert_eq!(eval.eval_str("(ash -1 -100)")?, Value::Fixnum(-1));
    assert_eq!(eval.eval_str("(< 1 2 3)")?, eval.t());
    assert_eq!(eval.eval_str("(< 1 3 2)")?, Value::Nil);
    assert_eq!(eval.eval_str("(>= 3 3 1)")?, eval.t());
    Ok(())
}

#[test]
fn equality() -> Result<()> {
    let eval = EvalEnvironment::new()?;
    assert_eq!(eval.eval_str("(eq 'a 'a)")?, eval.t());
    assert_eq!(eval.eval_str("(eq \"a\" (string #\\a))")?, Value::Nil);
    assert_eq!(eval.eval_str("(equal \"a\" (string #\\a))")?, eval.t());
    assert_eq!(eval.eval_str("(equal '(1 (2 #(3))) '(1 (2 #(3))))")?, eval.t());
    assert_eq!(eval.eval_str("(eql 3 3)")?, eval.t());
    assert_eq!(eval.eval_str("(not nil)")?, eval.t());
    assert_eq!(eval.eval_str("(null '(1))")?, Value::Nil);
    Ok(())
}

#[rstest]
#[case("(fixnump 1)", true)]
#[case("(fixnump #\\a)", false)]
#[case("(characterp #\\a)", true)]
#[case("(symbolp 'a)", true)]
#[case("(symbolp nil)", false)]
#[case("(consp '(1))", true)]
#[case("(consp nil)", false)]
#[case("(stringp \"\")", true)]
#[case("(vectorp #())", true)]
#[case("(functionp #'car)", true)]
#[case("(functionp 'car)", false)]
#[case("(hash-table-p (make-hash-table))", true)]
fn predicates(#[case] input: &str, #[case] want: bool) -> Result<()> {
    let eval = EvalEnvironment::new()?;
    assert_eq!(eval.eval_str(input)?, Value::from_bool(want, eval.t()));
    Ok(())
}

#[test]
fn hash_tables() -> Result<()> {
    let eval = EvalEnvironment::new()?;
    let got = eval_print(
        &eval,
        r#"
        (set h (make-hash-table))
        (sethash h "one" 1)
        (sethash h 'two 2)
        (list (gethash h "one") (gethash h 'two) (gethash h 'three 'none) (hash-table-count h))
        "#,
    )?;
    assert_eq!(got, "(1 2 none 2)");
    assert_eq!(eval.eval_str("(remhash h \"one\")")?, eval.t());
    assert_eq!(eval.eval_str("(remhash h \"one\")")?, Value::Nil);
    assert_eq!(eval.eval_str("(hash-table-count h)")?, Value::Fixnum(1));
    assert_eq!(eval.eval_str("(gethash h \"one\")")?, Value::Nil);
    assert_eq!(
        eval.eval_str("(= (sxhash \"abc\") (sxhash (string 'abc)))")?,
        eval.t()
    );
    Ok(())
}

#[test]
fn many_table_entries() -> Result<()> {
    let eval = EvalEnvironment::new()?;
    let got = eval.eval_str(
        r#"
        (set h (make-hash-table))
        (let ((i 0))
          (tagbody
           top
             (sethash h i (* i i))
             (set i (+ i 1))
             (cond ((< i 500) (go top)))))
        (list (hash-table-count h) (gethash h 0) (gethash h 499))
        "#,
    )?;
    assert_eq!(eval.store().display(got), "(500 0 249001)");
    Ok(())
}

#[test]
fn strings() -> Result<()> {
    let eval = EvalEnvironment::new()?;
    assert_eq!(
        eval_print(&eval, "(let ((s (make-string))) (strpush s #\\a) (strpush s #\\b) s)")?,
        "\"ab\""
    );
    assert_eq!(eval_print(&eval, "(make-string 3)")?, "\"   \"");
    assert_eq!(eval_print(&eval, "(make-string 2 #\\z)")?, "\"zz\"");
    assert_eq!(eval_print(&eval, "(strcat (string \"ab\") \"cd\" \"e\")")?, "\"abcde\"");
    assert_eq!(
        eval_print(&eval, "(list (position \"hello\" #\\l) (search \"hello\" \"lo\") (search \"hello\" \"xyz\"))")?,
        "(2 3 nil)"
    );
    assert_eq!(eval_print(&eval, "(subseq \"hello\" 1 3)")?, "\"el\"");
    assert_eq!(eval_print(&eval, "(subseq \"hello\" 3)")?, "\"lo\"");
    assert_eq!(eval_print(&eval, "(subseq \"hello\" -2 99)")?, "\"hello\"");
    assert_eq!(eval_print(&eval, "(char \"abc\" 1)")?, "#\\b");
    assert_eq!(
        eval_print(&eval, "(let ((s (string \"abc\"))) (setchar s 0 #\\z) s)")?,
        "\"zbc\""
    );
    assert_eq!(eval_print(&eval, "(let ((s (make-string 1 #\\q))) (strpop s))")?, "#\\q");
    assert_eq!(eval.eval_str("(length \"four\")")?, Value::Fixnum(4));
    assert_eq!(eval.eval_str("(length '(1 2 3))")?, Value::Fixnum(3));
    assert_eq!(eval.eval_str("(length nil)")?, Value::Fixnum(0));
    Ok(())
}

#[test]
fn conversions() -> Result<()> {
    let eval = EvalEnvironment::new()?;
    assert_eq!(eval_print(&eval, "(int->str 42)")?, "\"42\"");
    assert_eq!(eval_print(&eval, "(int->str -31 16)")?, "\"-#x1f\"");
    assert_eq!(eval_print(&eval, "(int->str 5 2)")?, "\"#b101\"");
    assert_eq!(eval_print(&eval, "(int->str 8 8)")?, "\"#o10\"");
    assert_eq!(eval.eval_str("(str->int \"-#x1f\")")?, Value::Fixnum(-31));
    assert_eq!(eval.eval_str("(str->int \"123\")")?, Value::Fixnum(123));
    assert_eq!(eval.eval_str("(str->int \"abc\")")?, Value::Nil);
    assert_eq!(eval.eval_str("(char-code #\\A)")?, Value::Fixnum(65));
    assert_eq!(eval.eval_str("(code-char 97)")?, Value::Char(b'a'));
    assert_eq!(eval_print(&eval, "(symbol-name 'abc)")?, "\"abc\"");
    assert_eq!(eval.eval_str("(eq (intern \"abc\") 'abc)")?, eval.t());
    assert_eq!(eval.eval_str("(eq (symbol \"abc\") 'abc)")?, eval.t());
    assert_eq!(eval_print(&eval, "(string 'abc)")?, "\"abc\"");
    assert_eq!(eval.eval_str("(eq (gensym) (gensym))")?, Value::Nil);
    assert_eq!(eval.eval_str("(symbolp (gensym \"tmp\"))")?, eval.t());
    Ok(())
}

#[test]
fn symbol_names_are_copies() -> Result<()> {
    let eval = EvalEnvironment::new()?;
    eval.eval_str("(let ((s (symbol-name 'abc))) (setchar s 0 #\\z))")?;
    assert_eq!(eval_print(&eval, "'abc")?, "abc");
    Ok(())
}

#[test]
fn vectors() -> Result<()> {
    let eval = EvalEnvironment::new()?;
    assert_eq!(
        eval_print(&eval, "(let ((v (make-vector 2 0))) (vecpush v 'x) (setvecelt v 0 5) v)")?,
        "#(5 0 x)"
    );
    assert_eq!(eval.eval_str("(vecpush (make-vector) 1)")?, Value::Fixnum(1));
    assert_eq!(eval_print(&eval, "(vector 1 'a \"s\")")?, "#(1 a \"s\")");
    assert_eq!(eval_print(&eval, "(vecpop (vector 1 2))")?, "2");
    assert_eq!(eval_print(&eval, "(vecelt #(a b c) 2)")?, "c");
    assert_eq!(eval_print(&eval, "(subseq #(a b c) 1)")?, "#(b c)");
    assert_eq!(eval_print(&eval, "(position #(a b c) 'b)")?, "1");
    assert_eq!(
        eval_print(&eval, "(let ((v (vector 1 2 3))) (set-fill-pointer v 1) v)")?,
        "#(1)"
    );
    assert_eq!(
        eval_print(&eval, "(let ((v (vector 1))) (set-fill-pointer v 3) (fill-pointer v))")?,
        "3"
    );
    assert_eq!(
        eval_print(&eval, "(let ((v (vector 1))) (set-fill-pointer v 3) v)")?,
        "#(1 nil nil)"
    );
    Ok(())
}

#[rstest]
#[case("(car 5)", ErrorKind::Type)]
#[case("(+ 1 'a)", ErrorKind::Type)]
#[case("(quot 1 0)", ErrorKind::Type)]
#[case("(car nil)", ErrorKind::Type)]
#[case("(strpush \"a\" 1)", ErrorKind::Type)]
#[case("(gethash 1 2)", ErrorKind::Type)]
#[case("(apply #'list 1 2)", ErrorKind::Type)]
#[case("(cons 1)", ErrorKind::Arity)]
#[case("((lambda (x) x))", ErrorKind::Arity)]
#[case("nope", ErrorKind::Unbound)]
#[case("(nope)", ErrorKind::Unbound)]
#[case("(char \"abc\" 5)", ErrorKind::Index)]
#[case("(char \"abc\" -1)", ErrorKind::Index)]
#[case("(strpop (make-string))", ErrorKind::Index)]
#[case("(vecpop (make-vector))", ErrorKind::Index)]
#[case("(die \"boom\")", ErrorKind::User)]
#[case("(1 2)", ErrorKind::Syntax)]
#[case("(read \"(\")", ErrorKind::Syntax)]
#[case("(* 4611686018427387904 2)", ErrorKind::Resource)]
fn error_kinds(#[case] input: &str, #[case] kind: ErrorKind) -> Result<()> {
    let eval = EvalEnvironment::new()?;
    match eval.eval_str(input) {
        Err(e) => assert_eq!(e.kind(), kind, "{e}"),
        Ok(v) => panic!("unexpected result: {}", eval.store().display(v)),
    }
    // Nothing is left behind on the operand stack.
    assert_eq!(eval.store().stack_len(), 0);
    Ok(())
}

#[test]
fn die_message() -> Result<()> {
    let eval = EvalEnvironment::new()?;
    match eval.eval_str("(die \"bad thing:\" 42 'sym)") {
        Err(Error::User(m)) => assert_eq!(m, "bad thing: 42 sym"),
        v => panic!("unexpected eval result: {:?}", v),
    };
    Ok(())
}

#[test]
fn lenient_nil() -> Result<()> {
    let eval =
        EvalEnvironment::with_config(Config::default().with_nil_access(NilAccess::Lenient))?;
    assert_eq!(eval.eval_str("(car nil)")?, Value::Nil);
    assert_eq!(eval.eval_str("(cdr (cdr '(1)))")?, Value::Nil);
    Ok(())
}

#[test]
fn output() -> Result<()> {
    let eval = EvalEnvironment::new()?;
    eval.eval_str("(print '(1 \"a\")) (prin1 'x) (terpri)")?;
    assert_eq!(eval.take_output(), b"(1 \"a\")\nx\n");
    assert!(eval.take_output().is_empty());
    Ok(())
}

#[test]
fn read_and_eval() -> Result<()> {
    let eval = EvalEnvironment::new()?;
    assert_eq!(eval.eval_str("(eval (read \"(+ 1 2)\"))")?, Value::Fixnum(3));
    assert_eq!(eval_print(&eval, "(read \"\")")?, "+eof+");
    assert_eq!(eval.eval_str("(eq (read \"  \") +eof+)")?, eval.t());
    assert_eq!(eval.eval_str("(eval ''x)")?, eval.store().intern_str("x")?);
    Ok(())
}

#[test]
fn disassemble() -> Result<()> {
    let eval = EvalEnvironment::new()?;
    eval.eval_str("(disassemble (lambda (x) (car x)))")?;
    let listing = String::from_utf8_lossy(&eval.take_output()).into_owned();
    assert!(listing.contains("Call(1)"), "{listing}");
    assert!(listing.contains("Return"), "{listing}");
    match eval.eval_str("(disassemble #'car)") {
        Err(Error::Type(_)) => (),
        v => panic!("unexpected eval result: {:?}", v),
    };
    Ok(())
}

#[test]
fn room() -> Result<()> {
    let eval = EvalEnvironment::new()?;
    match eval.eval_str("(room)")? {
        Value::Fixnum(n) => assert!(n > 0),
        v => panic!("unexpected result: {v:?}"),
    }
    match eval.eval_str("(objroom (make-vector 100))")? {
        Value::Fixnum(n) => assert!(n >= 100 * std::mem::size_of::<Value>() as i64),
        v => panic!("unexpected result: {v:?}"),
    }
    assert_eq!(eval.eval_str("(objroom 3)")?, Value::Nil);
    Ok(())
}

#[rstest]
#[case(Collector::Incremental)]
#[case(Collector::MarkSweep)]
fn structures_survive_collection(#[case] collector: Collector) -> Result<()> {
    let eval = EvalEnvironment::with_config(Config::default().with_collector(collector))?;
    eval.eval_str(
        r#"
        (set-function 'build
          (lambda (n acc) (cond ((= n 0) acc) (t (build (- n 1) (cons n acc))))))
        (set l (build 2000 nil))
        (gc)
        "#,
    )?;
    assert_eq!(eval.eval_str("(length l)")?, Value::Fixnum(2000));
    assert_eq!(eval.eval_str("(car (cdr l))")?, Value::Fixnum(2));
    eval.store().verify()?;
    Ok(())
}

#[rstest]
#[case(Collector::Incremental)]
#[case(Collector::MarkSweep)]
fn garbage_is_reclaimed(#[case] collector: Collector) -> Result<()> {
    let eval = EvalEnvironment::with_config(Config::default().with_collector(collector))?;
    eval.store().gc()?;
    let before = eval.store().current_stats();
    eval.eval_str(
        r#"
        (let ((i 0))
          (tagbody
           top
             (cons i i)
             (set i (+ i 1))
             (cond ((< i 10000) (go top)))))
        "#,
    )?;
    eval.store().gc()?;
    let after = eval.store().current_stats();
    assert!(after.allocated - before.allocated >= 10000);
    assert!(
        after.objects < before.objects + 100,
        "{before:?} -> {after:?}"
    );
    Ok(())
}

#[test]
fn heap_limit_is_a_resource_error() -> Result<()> {
    let eval = EvalEnvironment::new()?;
    let base = eval.store().current_stats().objects;
    let eval = EvalEnvironment::with_config(Config::default().with_heap_limit(Some(base + 200)))?;
    eval.eval_str("(set-function 'grow (lambda (acc) (grow (cons 1 acc))))")?;
    match eval.eval_str("(grow nil)") {
        Err(e) => assert_eq!(e.kind(), ErrorKind::Resource),
        Ok(v) => panic!("unexpected result: {v:?}"),
    }
    Ok(())
}

#[test]
fn self_containing_vectors() -> Result<()> {
    let eval = EvalEnvironment::new()?;
    eval.eval_str(
        r#"
        (set v (make-vector 2))
        (setvecelt v 0 v)
        (setvecelt v 1 v)
        (set w (make-vector 2))
        (setvecelt w 0 w)
        (setvecelt w 1 w)
        "#,
    )?;
    assert_eq!(eval_print(&eval, "(progn (print v) 1)")?, "1");
    assert_eq!(eval.take_output(), b"#(#<cycle> #<cycle>)\n");
    assert_eq!(eval.eval_str("(equal v w)")?, eval.t());
    assert_eq!(eval.eval_str("(= (sxhash v) (sxhash w))")?, eval.t());
    assert_eq!(eval_print(&eval, "(length v)")?, "2");

    eval.eval_str("(set h (make-hash-table)) (sethash h v 'found)")?;
    assert_eq!(eval_print(&eval, "(gethash h w)")?, "found");
    Ok(())
}

#[test]
fn self_containing_conses() -> Result<()> {
    let eval = EvalEnvironment::new()?;
    eval.eval_str(
        r#"
        (set c (list 1))
        (setcar c c)
        (setcdr c c)
        (set d (list 1))
        (setcar d d)
        (setcdr d d)
        "#,
    )?;
    eval.eval_str("(print c)")?;
    assert_eq!(eval.take_output(), b"(#<cycle> ...)\n");
    assert_eq!(eval.eval_str("(equal c d)")?, eval.t());
    assert_eq!(eval.eval_str("(= (sxhash c) (sxhash d))")?, eval.t());
    Ok(())
}

#[rstest]
#[case("(length x)")]
#[case("(apply #'list x)")]
#[case("(apply #'+ 1 x)")]
fn circular_lists_are_type_errors(#[case] input: &str) -> Result<()> {
    let eval = EvalEnvironment::new()?;
    eval.eval_str("(set x (list 1 2 3)) (setcdr (cdr (cdr x)) x)")?;
    match eval.eval_str(input) {
        Err(e) => assert_eq!(e.kind(), ErrorKind::Type, "{e}"),
        Ok(v) => panic!("unexpected result: {}", eval.store().display(v)),
    }
    assert_eq!(eval.store().stack_len(), 0);
    Ok(())
}

#[test]
fn circular_code_is_a_syntax_error() -> Result<()> {
    let eval = EvalEnvironment::new()?;
    // A call whose argument list loops back on itself.
    eval.eval_str("(set f (list 'list 1)) (setcdr (cdr f) (cdr f))")?;
    match eval.eval_str("(eval f)") {
        Err(e) => assert_eq!(e.kind(), ErrorKind::Syntax, "{e}"),
        Ok(v) => panic!("unexpected result: {}", eval.store().display(v)),
    }
    // A form that contains itself.
    eval.eval_str("(set g (list 'progn 1)) (setcar (cdr g) g)")?;
    match eval.eval_str("(eval g)") {
        Err(e) => assert_eq!(e.kind(), ErrorKind::Syntax, "{e}"),
        Ok(v) => panic!("unexpected result: {}", eval.store().display(v)),
    }
    assert_eq!(eval.store().stack_len(), 0);
    Ok(())
}
