//! IR fixtures
//!
//! Each fixture keeps the ids tests need to drive the heuristic by hand.

use nvmsym_core::shared::models::{FunctionId, InstId, KModule, ModuleBuilder};
use std::sync::Arc;

/// `void f() { return; }`
pub fn trivial_module() -> (Arc<KModule>, FunctionId) {
    let mut mb = ModuleBuilder::new("trivial");
    let f = mb.declare_function("f", &[]);
    mb.define(f).at("trivial.c", 1).ret(None);
    (Arc::new(mb.build().unwrap()), f)
}

pub struct NvmStoreFixture {
    pub module: Arc<KModule>,
    pub main: FunctionId,
    pub g: FunctionId,
    /// `m = mmap()` in main
    pub alloc: InstId,
    /// `g(m)` in main
    pub call_g: InstId,
    /// `*p = 1` in g
    pub store: InstId,
    pub ret_g: InstId,
    pub ret_main: InstId,
}

/// `void g(int* p) { *p = 1; }` called with a pointer returned by `mmap`
pub fn nvm_store_module() -> NvmStoreFixture {
    let mut mb = ModuleBuilder::new("nvm_store");
    let mmap = mb.declare_function("mmap", &[]);
    let g = mb.declare_function("g", &["p"]);
    let main = mb.declare_function("main", &[]);
    let one = mb.constant("1");
    let p = mb.param(g, 0);

    let (store, ret_g);
    {
        let mut fb = mb.define(g);
        fb.at("g.c", 2);
        store = fb.store(one, p);
        ret_g = fb.at("g.c", 3).ret(None);
    }
    let (alloc, call_g, ret_main);
    {
        let mut fb = mb.define(main);
        fb.at("main.c", 10);
        alloc = fb.call("m", mmap, &[]);
        call_g = fb.at("main.c", 11).call("", g, &[alloc]);
        ret_main = fb.at("main.c", 12).ret(None);
    }

    NvmStoreFixture {
        module: Arc::new(mb.build().unwrap()),
        main,
        g,
        alloc,
        call_g,
        store,
        ret_g,
        ret_main,
    }
}

pub struct IndirectFlushFixture {
    pub module: Arc<KModule>,
    pub main: FunctionId,
    pub h: FunctionId,
    /// `fp = (void*)&h` in main
    pub fp: InstId,
    /// `fp()` in main
    pub call: InstId,
}

/// `fp = &h; fp();` where `h` maps NVM and flushes it
pub fn indirect_flush_module() -> IndirectFlushFixture {
    let mut mb = ModuleBuilder::new("indirect");
    let mmap = mb.declare_function("mmap", &[]);
    let clwb = mb.declare_function("clwb", &["addr"]);
    let h = mb.declare_function("h", &[]);
    let main = mb.declare_function("main", &[]);
    {
        let mut fb = mb.define(h);
        let m = fb.call("m", mmap, &[]);
        fb.call("", clwb, &[m]);
        fb.ret(None);
    }
    let h_addr = mb.function_value(h);
    let (fp, call);
    {
        let mut fb = mb.define(main);
        fp = fb.cast("fp", h_addr);
        call = fb.call_indirect("", fp, &[]);
        fb.ret(None);
    }

    IndirectFlushFixture {
        module: Arc::new(mb.build().unwrap()),
        main,
        h,
        fp,
        call,
    }
}

/// `main` allocates a stack slot and spawns nothing; `worker(arg)` returns
pub fn threaded_module() -> Arc<KModule> {
    let mut mb = ModuleBuilder::new("threads");
    let main = mb.declare_function("main", &[]);
    let worker = mb.declare_function("worker", &["arg"]);
    {
        let mut fb = mb.define(main);
        fb.at("main.c", 3).alloca("x");
        fb.at("main.c", 4).ret(None);
    }
    mb.define(worker).at("worker.c", 1).ret(None);
    Arc::new(mb.build().unwrap())
}
