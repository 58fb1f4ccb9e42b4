/// Something that can render its internal state for diagnostics.
pub trait StateDumper: Send + Sync {
    fn name(&self) -> &str;

    fn dump(&self) -> String;
}

/// Render several dumpers one after another, each under a heading.
pub fn dump_all(dumpers: &[&dyn StateDumper]) -> String {
    let mut out = String::new();
    for dumper in dumpers {
        out.push_str(&format!("=== {} ===\n", dumper.name()));
        out.push_str(&dumper.dump());
        if !out.ends_with('\n') {
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str, &'static str);

    impl StateDumper for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        fn dump(&self) -> String {
            self.1.to_string()
        }
    }

    #[test]
    fn test_dump_all_adds_headings() {
        let a = Fixed("first", "one");
        let b = Fixed("second", "two\n");
        let text = dump_all(&[&a, &b]);
        assert_eq!(text, "=== first ===\none\n=== second ===\ntwo\n");
    }
}
