pub mod edge;
pub mod env;
pub mod node;

/// Joins `words` the way `echo` prints them.
pub fn echo(words: &[String]) -> String {
    words.join(" ")
}
