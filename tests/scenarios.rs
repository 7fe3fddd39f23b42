extern crate stackeff;

use std::panic::{catch_unwind, panic_any, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use stackeff::{CoConfig, Context, Coroutine, Effect, Error, Handler, State, Yielder};

#[test]
fn successive_resumes_should_return_yields_then_result() {
    let co = Coroutine::new(|_: (), y: &Yielder<(), &'static str>| {
        y.yield_("hello")?;
        y.yield_("world")?;
        Ok("!")
    })
    .unwrap();

    let mut out = Vec::new();
    for _ in 0..3 {
        out.push(co.resume(()).unwrap());
    }
    assert_eq!(out, vec!["hello", "world", "!"]);
    assert_eq!(co.state(), State::Done);

    match co.resume(()) {
        Err(Error::CannotResume(State::Done)) => {}
        r => panic!("unexpected {:?}", r),
    }
    assert_eq!(co.state(), State::Done);
}

#[test]
fn handler_returning_argument_should_abort() {
    let ctx = Context::new();
    let e: Effect<i32, i32> = Effect::new();
    let h = Handler::identity().on(&e, |arg, _| Ok(arg));

    assert_eq!(h.handle(&ctx, move |ctx| e.perform(ctx, 42)).unwrap(), 42);
}

#[test]
fn inner_handler_should_forward_through_outer() {
    let ctx = Context::new();
    let e: Effect<i32, i32> = Effect::new();
    let base: Handler<i32, i32> = Handler::new(|v| Ok(v));

    let c = ctx.clone();
    let hin = base.clone().on(&e, move |arg, k| k.resume(e.perform(&c, arg)?));
    let hout = base.on(&e, |arg, k| k.resume(arg));

    let res = hout
        .handle(&ctx, move |ctx| hin.handle(ctx, move |ctx| e.perform(ctx, 42)))
        .unwrap();
    assert_eq!(res, 42);
}

#[test]
fn inner_abort_through_outer_should_work() {
    let ctx = Context::new();
    let e: Effect<i32, i32> = Effect::new();
    let base: Handler<i32, i32> = Handler::identity();

    let c = ctx.clone();
    let hin = base.clone().on(&e, move |arg, _| e.perform(&c, arg));
    let hout = base.on(&e, |arg, _| Ok(arg));

    let res = hout
        .handle(&ctx, move |ctx| hin.handle(ctx, move |ctx| e.perform(ctx, 42)))
        .unwrap();
    assert_eq!(res, 42);
}

#[test]
fn effect_unhandled_in_every_scope_should_fail() {
    let ctx = Context::new();
    let e: Effect<(), ()> = Effect::new();
    let unrelated: Effect<(), ()> = Effect::new();
    let base: Handler<(), ()> = Handler::identity();
    let hin = base.clone().on(&unrelated, |_, k| k.resume(()));
    let hout = base.on(&unrelated, |_, k| k.resume(()));

    let res = hout.handle(&ctx, move |ctx| hin.handle(ctx, move |ctx| e.perform(ctx, ())));
    match res {
        Err(Error::UnhandledEffect(id)) => assert_eq!(id, e.id()),
        r => panic!("unexpected {:?}", r),
    }
}

#[test]
fn panic_in_thunk_should_reraise() {
    let ctx = Context::new();
    let h: Handler<i32, i32> = Handler::identity();

    let payload = catch_unwind(AssertUnwindSafe(|| {
        let _ = h.handle(&ctx, |_| -> stackeff::Result<i32> { panic_any(42) });
    }))
    .err()
    .expect("handle should re-raise the panic");
    assert_eq!(*payload.downcast_ref::<i32>().unwrap(), 42);
}

#[test]
fn intermediate_handler_should_intercept_after_outer_resume() {
    let ctx = Context::new();
    let ask: Effect<(), i32> = Effect::new();
    let tell: Effect<(), i32> = Effect::new();
    let noise: Effect<(), ()> = Effect::new();
    let tells = Arc::new(AtomicUsize::new(0));

    let outer: Handler<i32, i32> = Handler::identity().on(&ask, |_, k| k.resume(1));
    let counter = tells.clone();
    let middle: Handler<i32, i32> = Handler::identity().on(&tell, move |_, k| {
        counter.fetch_add(1, Ordering::SeqCst);
        k.resume(100)
    });
    let inner: Handler<i32, i32> = Handler::identity().on(&noise, |_, k| k.resume(()));

    let res = outer
        .handle(&ctx, move |ctx| {
            middle.handle(ctx, move |ctx| {
                inner.handle(ctx, move |ctx| {
                    // Passes through inner and middle, resumed from outer.
                    let a = ask.perform(ctx, ())?;
                    // Must still be seen by middle.
                    let b = tell.perform(ctx, ())?;
                    noise.perform(ctx, ())?;
                    Ok(a + b)
                })
            })
        })
        .unwrap();

    assert_eq!(res, 101);
    assert_eq!(tells.load(Ordering::SeqCst), 1);
    assert_eq!(ctx.pending(), 0);
}

#[test]
fn repeated_outer_resumes_should_keep_handler_chain() {
    let ctx = Context::new();
    let ask: Effect<(), i32> = Effect::new();
    let tell: Effect<i32, ()> = Effect::new();
    let told = Arc::new(AtomicUsize::new(0));

    let outer: Handler<i32, i32> = Handler::identity().on(&ask, |_, k| k.resume(2));
    let sum = told.clone();
    let middle: Handler<i32, i32> = Handler::identity().on(&tell, move |n, k| {
        sum.fetch_add(n as usize, Ordering::SeqCst);
        k.resume(())
    });

    let res = outer
        .handle(&ctx, move |ctx| {
            middle.handle(ctx, move |ctx| {
                let mut total = 0;
                for _ in 0..5 {
                    let n = ask.perform(ctx, ())?;
                    tell.perform(ctx, n)?;
                    total += n;
                }
                Ok(total)
            })
        })
        .unwrap();

    assert_eq!(res, 10);
    assert_eq!(told.load(Ordering::SeqCst), 10);
}

#[test]
fn long_chain_of_forwarded_performs_should_finish() {
    let ctx = Context::with_config(CoConfig {
        stack_size: 1024 * 1024,
        ..CoConfig::default()
    });
    let ask: Effect<(), i32> = Effect::new();
    let noise: Effect<(), ()> = Effect::new();
    let noises = Arc::new(AtomicUsize::new(0));

    let outer: Handler<i32, i32> = Handler::identity().on(&ask, |_, k| k.resume(1));
    let counter = noises.clone();
    let inner: Handler<i32, i32> = Handler::identity().on(&noise, move |_, k| {
        counter.fetch_add(1, Ordering::SeqCst);
        k.resume(())
    });

    let res = outer
        .handle(&ctx, move |ctx| {
            inner.handle(ctx, move |ctx| {
                let mut n = 0;
                for i in 0..1000 {
                    // Each one passes through inner on its way out.
                    n += ask.perform(ctx, ())?;
                    if i % 10 == 0 {
                        noise.perform(ctx, ())?;
                    }
                }
                Ok(n)
            })
        })
        .unwrap();

    assert_eq!(res, 1000);
    assert_eq!(noises.load(Ordering::SeqCst), 100);
    assert_eq!(ctx.pending(), 0);
}

#[test]
fn independent_contexts_should_run_in_parallel() {
    let workers: Vec<_> = (0..4)
        .map(|i| {
            std::thread::spawn(move || {
                let ctx = Context::new();
                let get: Effect<(), i32> = Effect::new();
                let h = Handler::identity().on(&get, move |_, k| k.resume(i));
                h.handle(&ctx, move |ctx| {
                    let mut n = 0;
                    for _ in 0..50 {
                        n += get.perform(ctx, ())?;
                    }
                    Ok(n)
                })
                .unwrap()
            })
        })
        .collect();

    let results: Vec<i32> = workers.into_iter().map(|w| w.join().unwrap()).collect();
    assert_eq!(results, vec![0, 50, 100, 150]);
}
