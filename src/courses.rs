//! Ordering of the course list.

use crate::forum::Course;

/// Sort key for a term label like "Fall 2024": `(year, season rank)`.
///
/// Labels that do not parse sort as `(0, 0)`, after every real term.
#[must_use]
pub fn term_key(term: &str) -> (u32, u8) {
    let mut parts = term.split_whitespace();
    let (Some(season), Some(year), None) = (parts.next(), parts.next(), parts.next()) else {
        return (0, 0);
    };
    let rank = match season {
        "Winter" => 3,
        "Fall" => 2,
        "Summer" => 1,
        _ => return (0, 0),
    };
    year.parse().map_or((0, 0), |year| (year, rank))
}

/// Sort courses most recent term first, keeping the original order on ties.
pub fn sort_by_term(courses: &mut [Course]) {
    courses.sort_by_key(|course| std::cmp::Reverse(term_key(&course.term)));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn course(name: &str, term: &str) -> Course {
        Course {
            nid: name.to_lowercase(),
            name: name.to_string(),
            term: term.to_string(),
        }
    }

    #[test]
    fn test_term_key() {
        assert_eq!(term_key("Fall 2024"), (2024, 2));
        assert_eq!(term_key("Winter 2025"), (2025, 3));
        assert_eq!(term_key("Summer 2023"), (2023, 1));
        assert_eq!(term_key("Spring 2024"), (0, 0));
        assert_eq!(term_key("Fall"), (0, 0));
        assert_eq!(term_key("Fall twenty"), (0, 0));
        assert_eq!(term_key(""), (0, 0));
    }

    #[test]
    fn test_sort_most_recent_first() {
        let mut courses = vec![
            course("A", "Fall 2023"),
            course("B", "Winter 2024"),
            course("C", "Misc"),
            course("D", "Fall 2024"),
            course("E", "Summer 2024"),
        ];
        sort_by_term(&mut courses);
        let names: Vec<&str> = courses.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["B", "D", "E", "A", "C"]);
    }

    #[test]
    fn test_sort_is_stable_for_equal_terms() {
        let mut courses = vec![course("X", "Fall 2024"), course("Y", "Fall 2024")];
        sort_by_term(&mut courses);
        assert_eq!(courses[0].name, "X");
    }
}
