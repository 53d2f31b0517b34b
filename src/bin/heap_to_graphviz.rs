//! Evaluate a program, then render the live heap as Graphviz.
//!
//! Inspired by [@thingskatedid][kate] and [Ben Weintraub][ben].
//!
//! [kate]: https://twitter.com/thingskatedid/status/1386077306381242371?ref_src=twsrc%5Etfw
//! [ben]: https://www.benweintraub.com/2022/11/12/graphviz-in-the-terminal/
//!
//! Usage:
//!
//! ```ignore
//! <input.lisp heap_to_graphviz | dot -T png >output.png
//! <input.lisp heap_to_graphviz --save
//! ```
//!
//! With `--save`, the DOT source goes to a file whose path is printed instead.

use std::io::{Read, Write};

use bytelisp::config::Config;
use bytelisp::eval::EvalEnvironment;
use bytelisp::{render_store, save_graph};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let save = std::env::args().skip(1).any(|arg| arg == "--save");
    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)?;

    let env = EvalEnvironment::with_config(Config::from_env())?;
    let result = env.eval_str(&input)?;
    // Keep the result in the picture.
    let _result = env.store().root(result);
    env.store().gc()?;

    let dot = render_store(env.store())?;
    if save {
        let path = save_graph(&dot)?;
        println!("{}", path.display());
    } else {
        std::io::stdout().write_all(&dot)?;
    }
    Ok(())
}
