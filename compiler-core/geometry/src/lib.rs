mod abs;

pub use abs::{Abs, LengthError, SCALE, parse_length};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Size {
    pub width: Abs,
    pub height: Abs,
}

impl Size {
    pub const fn new(width: Abs, height: Abs) -> Size {
        Size { width, height }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: Abs,
    pub y: Abs,
}

impl Point {
    pub const fn new(x: Abs, y: Abs) -> Point {
        Point { x, y }
    }

    pub fn offset(self, x: Abs, y: Abs) -> Point {
        Point { x: self.x + x, y: self.y + y }
    }
}

/// An axis-aligned rectangle; `y` grows downwards from the top of the page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    pub origin: Point,
    pub size: Size,
}

impl Rect {
    pub const fn new(origin: Point, size: Size) -> Rect {
        Rect { origin, size }
    }

    pub fn right(&self) -> Abs {
        self.origin.x + self.size.width
    }

    pub fn bottom(&self) -> Abs {
        self.origin.y + self.size.height
    }

    pub fn contains(&self, point: Point) -> bool {
        self.origin.x <= point.x
            && point.x < self.right()
            && self.origin.y <= point.y
            && point.y < self.bottom()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Margins {
    pub top: Abs,
    pub right: Abs,
    pub bottom: Abs,
    pub left: Abs,
}

impl Margins {
    pub const fn uniform(margin: Abs) -> Margins {
        Margins { top: margin, right: margin, bottom: margin, left: margin }
    }
}

/// Page size and margins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageGeometry {
    pub size: Size,
    pub margins: Margins,
}

impl PageGeometry {
    /// 210mm x 297mm.
    pub const A4: Size = Size::new(Abs::raw(39158276), Abs::raw(55380990));
    /// 8.5in x 11in.
    pub const LETTER: Size = Size::new(Abs::raw(40258437), Abs::raw(52099154));

    pub fn new(size: Size, margins: Margins) -> PageGeometry {
        PageGeometry { size, margins }
    }

    pub fn content(&self) -> Rect {
        let origin = Point::new(self.margins.left, self.margins.top);
        let width = self.size.width - self.margins.left - self.margins.right;
        let height = self.size.height - self.margins.top - self.margins.bottom;
        Rect::new(origin, Size::new(width.max(Abs::ZERO), height.max(Abs::ZERO)))
    }
}

impl Default for PageGeometry {
    fn default() -> PageGeometry {
        PageGeometry::new(PageGeometry::A4, Margins::uniform(Abs::pt(72)))
    }
}

#[cfg(test)]
mod tests {
    use super::{Abs, PageGeometry, parse_length};

    #[test]
    fn test_paper_sizes() {
        let a4 = PageGeometry::A4;
        assert_eq!(parse_length("210mm", Abs::ZERO), Ok(a4.width));
        assert_eq!(parse_length("297mm", Abs::ZERO), Ok(a4.height));

        let letter = PageGeometry::LETTER;
        assert_eq!(parse_length("8.5in", Abs::ZERO), Ok(letter.width));
        assert_eq!(parse_length("11in", Abs::ZERO), Ok(letter.height));
    }

    #[test]
    fn test_content_area() {
        let geometry = PageGeometry::default();
        let content = geometry.content();
        assert_eq!(content.origin.x, Abs::pt(72));
        assert_eq!(content.size.width, PageGeometry::A4.width - Abs::pt(144));
        assert_eq!(content.bottom(), PageGeometry::A4.height - Abs::pt(72));
    }
}
