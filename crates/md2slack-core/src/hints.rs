//! Heuristic detectors that tag added diff lines with a signal type and a
//! short human hint. They are deliberately cheap substring checks: the model
//! downstream does the real interpretation, these only steer it.

/// A detector inspects one added line (and the file it belongs to).
pub trait Detector: Sync {
    /// Returns `(signal_type, hint)` when the line matches.
    fn detect(&self, line: &str, path: &str) -> Option<(&'static str, &'static str)>;
}

fn any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

macro_rules! hit {
    ($ty:expr, $hint:expr) => {
        Some(($ty, $hint))
    };
}

pub struct Timeout;
impl Detector for Timeout {
    fn detect(&self, line: &str, _path: &str) -> Option<(&'static str, &'static str)> {
        (line.contains("timeout") && any(line, &["waitFor", "setTimeout"]))
            .then_some(("timeout_change", "test execution timing adjusted"))
    }
}

pub struct ErrorHandling;
impl Detector for ErrorHandling {
    fn detect(&self, line: &str, _path: &str) -> Option<(&'static str, &'static str)> {
        any(line, &["try {", "catch", "if err !=", "throw new Error"])
            .then_some(("error_handling", "guarded failure path"))
    }
}

pub struct Schema;
impl Detector for Schema {
    fn detect(&self, line: &str, path: &str) -> Option<(&'static str, &'static str)> {
        (any(path, &["migration", "schema"]) || any(line, &["CREATE TABLE", "ALTER TABLE"]))
            .then_some(("schema_change", "data model update"))
    }
}

pub struct UiState;
impl Detector for UiState {
    fn detect(&self, line: &str, _path: &str) -> Option<(&'static str, &'static str)> {
        any(line, &["useState", "useEffect", "useRef", "loading"])
            .then_some(("logic_change", "ui state management"))
    }
}

pub struct Logic;
impl Detector for Logic {
    fn detect(&self, line: &str, _path: &str) -> Option<(&'static str, &'static str)> {
        any(line, &["for ", "if ", "return", "else"]).then_some(("logic_change", "flow control logic"))
    }
}

pub struct NextJs;
impl Detector for NextJs {
    fn detect(&self, line: &str, path: &str) -> Option<(&'static str, &'static str)> {
        let api = any(
            line,
            &[
                "NextResponse",
                "NextRequest",
                "getServerSideProps",
                "getStaticProps",
                "useRouter",
                "usePathname",
                "useSearchParams",
            ],
        );
        let app_route = path.contains("/app/") && any(path, &["page.tsx", "layout.tsx"]);
        (api || app_route).then_some(("framework_change", "nextjs routing/data flow"))
    }
}

pub struct Express;
impl Detector for Express {
    fn detect(&self, line: &str, _path: &str) -> Option<(&'static str, &'static str)> {
        let routes = any(
            line,
            &[
                "express()",
                "router.get(",
                "router.post(",
                "router.put(",
                "router.delete(",
                "app.use(",
            ],
        );
        let middleware = line.contains("req") && line.contains("res") && line.contains("next");
        (routes || middleware).then_some(("framework_change", "express middleware/route"))
    }
}

pub struct Drizzle;
impl Detector for Drizzle {
    fn detect(&self, line: &str, _path: &str) -> Option<(&'static str, &'static str)> {
        let direct = any(
            line,
            &[
                "drizzle-orm",
                "pgTable",
                "mysqlTable",
                "sqliteTable",
                "db.select(",
                "db.insert(",
                "db.update(",
            ],
        );
        let builder = line.contains("eq(") && line.contains("and(");
        (direct || builder).then_some(("framework_change", "drizzle orm query/schema"))
    }
}

pub struct Migration;
impl Detector for Migration {
    fn detect(&self, line: &str, path: &str) -> Option<(&'static str, &'static str)> {
        if path.contains("migration") && (path.ends_with(".sql") || path.ends_with(".ts")) {
            return hit!("migration", "database migration file");
        }
        if any(line, &["CREATE INDEX", "DROP TABLE", "ALTER COLUMN"]) {
            return hit!("migration", "database schema migration");
        }
        None
    }
}

pub struct TypeScript;
impl Detector for TypeScript {
    fn detect(&self, line: &str, _path: &str) -> Option<(&'static str, &'static str)> {
        let decl = any(line, &["interface ", "type ", "enum ", " as "]);
        let annotated =
            line.contains(": ") && any(line, &["string", "number", "boolean", "Promise<"]);
        let utility = any(line, &["Check<", "Pick<", "Omit<"]);
        (decl || annotated || utility).then_some(("type_change", "typescript definition/fix"))
    }
}

pub struct Auth;
impl Detector for Auth {
    fn detect(&self, line: &str, _path: &str) -> Option<(&'static str, &'static str)> {
        let markers = any(
            line,
            &[
                "NextAuth",
                "getServerSession",
                "useSession",
                "authorize",
                "credentials",
                "jwt",
                "JWT",
                "Bearer",
                "clerk",
                "Clerk",
            ],
        );
        let header = line.contains("headers") && line.contains("authorization");
        (markers || header).then_some(("auth_change", "authentication/authorization logic"))
    }
}

pub struct Refactor;
impl Detector for Refactor {
    fn detect(&self, line: &str, _path: &str) -> Option<(&'static str, &'static str)> {
        any(line, &["extract", "refactor", "helper", "utils/", "shared/"])
            .then_some(("refactor", "extracted reusable logic"))
    }
}

pub struct TestStability;
impl Detector for TestStability {
    fn detect(&self, line: &str, path: &str) -> Option<(&'static str, &'static str)> {
        (path.contains("test") && any(line, &["timeout", "waitFor", "retry", "poll("]))
            .then_some(("test_stability", "stabilized flaky test behavior"))
    }
}

pub struct Retry;
impl Detector for Retry {
    fn detect(&self, line: &str, _path: &str) -> Option<(&'static str, &'static str)> {
        any(line, &["for (let attempt", "retry", "attempt <"])
            .then_some(("retry_logic", "added retry mechanism"))
    }
}

pub struct StateGuard;
impl Detector for StateGuard {
    fn detect(&self, line: &str, _path: &str) -> Option<(&'static str, &'static str)> {
        if line.contains("useRef") && line.contains("initialized") {
            return hit!("state_guard", "prevented duplicate initialization");
        }
        if line.contains("if (") && line.contains("return;") && line.contains("already") {
            return hit!("state_guard", "guarded repeated execution");
        }
        None
    }
}

pub struct UxBugFix;
impl Detector for UxBugFix {
    fn detect(&self, line: &str, path: &str) -> Option<(&'static str, &'static str)> {
        (path.contains("client") && any(line, &["setDisabled", "stopwatch", "input"]))
            .then_some(("ux_bugfix", "fixed user-visible interaction issue"))
    }
}

pub struct OrmMigration;
impl Detector for OrmMigration {
    fn detect(&self, line: &str, path: &str) -> Option<(&'static str, &'static str)> {
        let orm = any(line, &["drizzle", "query."]);
        let service_update = line.contains("update(") && path.contains("service");
        (orm || service_update).then_some(("orm_migration", "migrated data access to ORM abstraction"))
    }
}

pub struct CompletionFlow;
impl Detector for CompletionFlow {
    fn detect(&self, line: &str, _path: &str) -> Option<(&'static str, &'static str)> {
        (line.contains("finish") && any(line, &["try", "catch", "finally"]))
            .then_some(("completion_flow", "hardened completion flow against failures"))
    }
}

pub struct RegressionTest;
impl Detector for RegressionTest {
    fn detect(&self, line: &str, path: &str) -> Option<(&'static str, &'static str)> {
        (path.contains("test") && line.contains("expect") && line.contains("not.toBe"))
            .then_some(("regression_test", "added regression coverage"))
    }
}

pub struct StyleAdjustment;
impl Detector for StyleAdjustment {
    fn detect(&self, line: &str, path: &str) -> Option<(&'static str, &'static str)> {
        (path.contains("css") || any(line, &["font-weight", "color:"]))
            .then_some(("ui_style", "adjusted visual styling"))
    }
}

pub struct StabilityGuard;
impl Detector for StabilityGuard {
    fn detect(&self, line: &str, _path: &str) -> Option<(&'static str, &'static str)> {
        any(line, &["catch (error", "console.error"])
            .then_some(("stability_guard", "logged and isolated runtime failure"))
    }
}

/// Every detector, in evaluation order. Order matters: signal types and
/// hints are recorded in first-seen order.
pub static DETECTORS: &[&dyn Detector] = &[
    &Timeout,
    &ErrorHandling,
    &Schema,
    &UiState,
    &Logic,
    &NextJs,
    &Express,
    &Drizzle,
    &Migration,
    &TypeScript,
    &Auth,
    &Refactor,
    &TestStability,
    &Retry,
    &StateGuard,
    &UxBugFix,
    &OrmMigration,
    &CompletionFlow,
    &RegressionTest,
    &StyleAdjustment,
    &StabilityGuard,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_needs_both_markers() {
        assert!(Timeout.detect("timeout: 5000", "a.ts").is_none());
        assert_eq!(
            Timeout.detect("await waitFor(x, { timeout: 5000 })", "a.ts"),
            Some(("timeout_change", "test execution timing adjusted"))
        );
    }

    #[test]
    fn migration_prefers_path_hint() {
        assert_eq!(
            Migration.detect("select 1", "db/migrations/001_init.sql").map(|h| h.1),
            Some("database migration file")
        );
        assert_eq!(
            Migration.detect("DROP TABLE users;", "db/seed.sql").map(|h| h.1),
            Some("database schema migration")
        );
        assert!(Migration.detect("x", "db/migrations/readme.md").is_none());
    }

    #[test]
    fn state_guard_has_two_shapes() {
        assert_eq!(
            StateGuard.detect("const initialized = useRef(false)", "a.tsx").map(|h| h.1),
            Some("prevented duplicate initialization")
        );
        assert_eq!(
            StateGuard.detect("if (already) return;", "a.ts").map(|h| h.1),
            Some("guarded repeated execution")
        );
    }

    #[test]
    fn path_scoped_detectors_ignore_other_paths() {
        assert!(UxBugFix.detect("<input />", "server/form.tsx").is_none());
        assert!(UxBugFix.detect("<input />", "client/form.tsx").is_some());
        assert!(RegressionTest.detect("expect(x).not.toBe(1)", "src/a.ts").is_none());
        assert!(RegressionTest.detect("expect(x).not.toBe(1)", "src/a.test.ts").is_some());
    }

    #[test]
    fn auth_header_combination() {
        assert!(Auth.detect("headers.authorization", "api.ts").is_some());
        assert!(Auth.detect("headers only", "api.ts").is_none());
    }

    #[test]
    fn detector_table_is_complete() {
        assert_eq!(DETECTORS.len(), 21);
    }
}
