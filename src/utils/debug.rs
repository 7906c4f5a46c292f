use crate::option::KernelConfig;
use crate::utils::pprint::PrettyPrint;

use std::cell::Cell;
use std::time::{Duration, Instant};

// Reports the IR of a kernel after each construction stage. Every stage is traced with the time
// spent since the previous one, and the IR itself is dumped when debug printing is enabled.
pub struct DebugEnv {
    kernel: String,
    debug_print: bool,
    last_stage: Cell<Instant>,
}

fn stage_report<T: PrettyPrint>(kernel: &str, stage: &str, elapsed: Duration, ast: &T) -> String {
    let header = format!("[{kernel}] {stage} after {0} us", elapsed.as_micros());
    format!("{header}\n{0}\n{1}", "-".repeat(header.len()), ast.pprint_default())
}

impl DebugEnv {
    pub fn new(config: &KernelConfig) -> DebugEnv {
        DebugEnv {
            kernel: config.function_name.clone(),
            debug_print: config.debug_print,
            last_stage: Cell::new(Instant::now()),
        }
    }

    pub fn print<T: PrettyPrint>(&self, stage: &str, ast: &T) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_stage.replace(now));
        tracing::debug!("Kernel {0}: {stage} took {1} us", self.kernel, elapsed.as_micros());
        if self.debug_print {
            println!("{}", stage_report(&self.kernel, stage, elapsed, ast));
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::utils::name::Name;

    use regex::Regex;

    #[test]
    fn report_has_underlined_header() {
        let ast = Name::new("ctr_0");
        let s = stage_report("jacobi", "Loop nest", Duration::from_micros(42), &ast);
        let re = Regex::new(r"^\[jacobi\] Loop nest after 42 us\n-+\nctr_0$").unwrap();
        assert!(re.is_match(&s));
    }

    #[test]
    fn stages_are_timed_separately() {
        let env = DebugEnv::new(&KernelConfig::default().with_debug_print(false));
        let before = env.last_stage.get();
        env.print("Typed assignments", &Name::new("x"));
        assert!(env.last_stage.get() >= before);
    }
}
