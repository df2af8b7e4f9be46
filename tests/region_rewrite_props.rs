// tests/region_rewrite_props.rs

use proptest::prelude::*;

use terminal_supervisor::settings::{parse_region_settings, rewrite_region_lines};
use terminal_supervisor::types::{RegionHost, RegionKey, RegionSettings};

fn host() -> impl Strategy<Value = RegionHost> {
    prop_oneof![
        Just(RegionHost::Nj),
        Just(RegionHost::Stage),
        Just(RegionHost::Dev),
    ]
}

#[derive(Debug, Clone)]
enum Line {
    Unrelated(String),
    Region(RegionKey, RegionHost),
}

// Unrelated property lines, comments and blanks. Names are drawn from a
// lowercase alphabet so they can never collide with a region key.
fn unrelated() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z_]{1,12}=[A-Za-z0-9._ ]{0,16}",
        "[a-z_]{1,12}: ?[0-9]{1,5}",
        "# [ -~]{0,20}",
        "! [ -~]{0,20}",
        Just(String::new()),
    ]
}

fn line() -> impl Strategy<Value = Line> {
    prop_oneof![
        4 => unrelated().prop_map(Line::Unrelated),
        1 => (prop_oneof![Just(RegionKey::Mdds), Just(RegionKey::Fpss)], host())
            .prop_map(|(k, h)| Line::Region(k, h)),
    ]
}

fn render(lines: &[Line]) -> String {
    let mut out = String::new();
    for line in lines {
        match line {
            Line::Unrelated(s) => out.push_str(s),
            Line::Region(k, h) => {
                out.push_str(k.property_name());
                out.push('=');
                out.push_str(&k.token(*h));
            }
        }
        out.push('\n');
    }
    out
}

fn is_region_line(line: &str) -> bool {
    line.starts_with("MDDS_REGION=") || line.starts_with("FPSS_REGION=")
}

proptest! {
    #[test]
    fn rewrite_preserves_unrelated_lines_in_order(
        lines in proptest::collection::vec(line(), 0..30),
        mdds in host(),
        fpss in host(),
    ) {
        let input = render(&lines);
        let target = RegionSettings { mdds, fpss };

        let output = rewrite_region_lines(&input, &target);

        let before: Vec<&str> = input.lines().filter(|l| !is_region_line(l)).collect();
        let after: Vec<&str> = output.lines().filter(|l| !is_region_line(l)).collect();
        prop_assert_eq!(before, after);

        prop_assert_eq!(parse_region_settings(&output), target);

        // Region lines that existed stay where they were.
        for (i, l) in input.lines().enumerate() {
            if is_region_line(l) {
                prop_assert!(is_region_line(output.lines().nth(i).unwrap_or("")));
            }
        }
    }

    #[test]
    fn rewrite_is_idempotent(
        lines in proptest::collection::vec(line(), 0..30),
        mdds in host(),
        fpss in host(),
    ) {
        let target = RegionSettings { mdds, fpss };
        let once = rewrite_region_lines(&render(&lines), &target);
        let twice = rewrite_region_lines(&once, &target);
        prop_assert_eq!(once, twice);
    }
}
