/// Time-of-day greeting for the given display name and local hour (0-23).
pub fn generate(name: &str, hour: u32) -> String {
    let salutation = match hour {
        0..=11 => "Good morning",
        12..=17 => "Good afternoon",
        _ => "Good evening",
    };
    format!("{}, {}. Here are your highlights for today.", salutation, name)
}
